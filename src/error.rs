/// Error types
/// `TerminalError` covers session/PTY lifecycle, `CommandError` covers built-in failures.
/// Both render as the plain text the user sees inside the terminal display.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("Failed to open PTY: {0}")]
    Pty(String),
    #[error("Failed to spawn shell: {0}")]
    Spawn(String),
    #[error("PTY I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("No session at tab {0}")]
    NoSuchSession(usize),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("'{0}' not found")]
    NotFound(String),
    #[error("'{0}' is a directory")]
    IsADirectory(String),
    #[error("'{0}' is not a directory")]
    NotADirectory(String),
    #[error("Permission denied: '{0}'")]
    PermissionDenied(String),
    #[error("Invalid PID format")]
    InvalidPid,
    #[error("No process with PID {0}")]
    NoSuchProcess(i32),
    #[error("PID {0} does not belong to this terminal")]
    NotPermitted(i32),
    #[error("Invalid time format")]
    InvalidDuration,
    #[error("{0}")]
    Introspection(String),
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Terminal(#[from] TerminalError),
}

impl CommandError {
    /// Map an I/O error on `path` to the message the user should see.
    pub fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => CommandError::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => CommandError::PermissionDenied(path.to_string()),
            _ => match err.raw_os_error() {
                #[cfg(unix)]
                Some(libc::EISDIR) => CommandError::IsADirectory(path.to_string()),
                #[cfg(unix)]
                Some(libc::ENOTDIR) => CommandError::NotADirectory(path.to_string()),
                _ => CommandError::Io(err),
            },
        }
    }
}

pub type CommandResult = Result<(), CommandError>;
