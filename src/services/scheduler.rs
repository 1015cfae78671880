/// Deferred callbacks
/// Timers fired from the owner's event loop instead of blocking it.

use crate::models::SessionId;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deferred {
    pub due: Instant,
    pub session: SessionId,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    pending: Vec<Deferred>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, delay: Duration, session: SessionId, message: impl Into<String>) {
        self.pending.push(Deferred {
            due: Instant::now() + delay,
            session,
            message: message.into(),
        });
    }

    /// Remove and return every callback due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<Deferred> {
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|d| d.due <= now);
        self.pending = pending;
        due.sort_by_key(|d| d.due);
        due
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|d| d.due).min()
    }

    /// Drop callbacks belonging to a closed tab.
    pub fn cancel_session(&mut self, session: SessionId) {
        self.pending.retain(|d| d.session != session);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
