/// Command History
/// Bounded FIFO of submitted lines with an up/down browse cursor

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDirection {
    /// Towards the oldest entry (Up arrow)
    Older,
    /// Towards the newest entry (Down arrow)
    Newer,
}

#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<String>,
    capacity: usize,
    /// `entries.len()` means "new entry", i.e. nothing recalled yet.
    cursor: usize,
}

impl CommandHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    /// Record a submitted line. Repeating the previous line is not stored twice.
    pub fn push(&mut self, line: &str) {
        if self.entries.back().map(String::as_str) != Some(line) {
            self.entries.push_back(line.to_string());
            while self.entries.len() > self.capacity {
                self.entries.pop_front();
            }
        }
        self.cursor = self.entries.len();
    }

    /// Move the cursor one step and return the recalled entry,
    /// or `None` when the move would leave `[0, len)`.
    pub fn navigate(&mut self, direction: HistoryDirection) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let next = match direction {
            HistoryDirection::Older => self.cursor.checked_sub(1)?,
            HistoryDirection::Newer => self.cursor + 1,
        };
        if next >= self.entries.len() {
            return None;
        }
        self.cursor = next;
        self.entries.get(next).map(String::as_str)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }
}
