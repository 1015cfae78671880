/// Models module
/// Shared data types between the terminal panel and its host.
/// Snapshot types are serializable so hosts can ship them over IPC.

use serde::{Deserialize, Serialize};

/// Stable identity of a tab. Survives respawns, never reused after close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u32);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Lifecycle of a tab's shell process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Running,
    /// Process ended and has not been replaced yet
    Exited,
    /// Spawn failed; the message is shown in the tab
    Failed { reason: String },
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running)
    }
}

/// Terminal tab info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub title: String,
    pub active: bool,
    #[serde(flatten)]
    pub state: SessionState,
    pub pid: Option<u32>,
    /// Number of processes spawned into this tab so far
    pub spawn_count: u32,
}

/// Whole-panel view for hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelSnapshot {
    pub sessions: Vec<SessionInfo>,
    pub active: usize,
    pub font_size: u8,
    pub history: Vec<String>,
    pub input: String,
    pub cwd: String,
    /// Active tab's scrollback without escape sequences
    pub screen: String,
}
