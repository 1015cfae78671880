/// Terminal panel configuration
///
/// Read from `$HEXTRIX_TERMINAL_CONFIG` when set, otherwise from
/// `$USER_HOME/.hextrix/terminal.json`. A missing file means defaults;
/// the panel never writes this file.

use crate::error::TerminalError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const MIN_FONT_SIZE: u8 = 6;
pub const MAX_FONT_SIZE: u8 = 24;
pub const DEFAULT_FONT_SIZE: u8 = 12;
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Shell to spawn in every tab. Falls back to `$SHELL`, then `/bin/bash`.
    pub shell: Option<String>,
    /// Working directory for spawned shells. Falls back to the user's home.
    pub home: Option<PathBuf>,
    pub cols: u16,
    pub rows: u16,
    pub font_size: u8,
    pub history_capacity: usize,
    /// Bytes of output kept per tab before the oldest text is dropped
    pub scrollback_limit: usize,
    /// Let `kill` signal processes that were not started from this panel
    pub allow_foreign_kill: bool,
    /// Editor handed to the shell by the `write` built-in. Falls back to `$EDITOR`, then `nano`.
    pub editor: Option<String>,
    /// Extra environment for spawned shells
    pub env: BTreeMap<String, String>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: None,
            home: None,
            cols: 80,
            rows: 24,
            font_size: DEFAULT_FONT_SIZE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            scrollback_limit: 256 * 1024,
            allow_foreign_kill: false,
            editor: None,
            env: BTreeMap::new(),
        }
    }
}

impl TerminalConfig {
    pub fn shell_path(&self) -> String {
        self.shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "/bin/bash".to_string())
    }

    pub fn home_dir(&self) -> PathBuf {
        self.home
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/"))
    }

    pub fn editor_command(&self) -> String {
        self.editor
            .clone()
            .or_else(|| std::env::var("EDITOR").ok())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "nano".to_string())
    }

    /// Reject values the panel cannot run with and clamp the font into range.
    pub fn validate(mut self) -> Result<Self, TerminalError> {
        if self.history_capacity == 0 {
            return Err(TerminalError::Config(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if self.cols == 0 || self.rows == 0 {
            return Err(TerminalError::Config(format!(
                "terminal size {}x{} is empty",
                self.cols, self.rows
            )));
        }
        self.font_size = self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        Ok(self)
    }
}

/// Get the path to the config file
///
/// Respects `HEXTRIX_TERMINAL_CONFIG` for tests and custom setups.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("HEXTRIX_TERMINAL_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".hextrix").join("terminal.json"))
}

/// Load configuration from `path`, or defaults when the file does not exist.
pub fn load_config_from(path: &Path) -> Result<TerminalConfig, TerminalError> {
    if !path.exists() {
        log::debug!("No terminal config at {}, using defaults", path.display());
        return TerminalConfig::default().validate();
    }

    let content = fs::read_to_string(path)
        .map_err(|e| TerminalError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    let config: TerminalConfig = serde_json::from_str(&content)
        .map_err(|e| TerminalError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    log::info!("Loaded terminal config from {}", path.display());
    config.validate()
}

pub fn load_config() -> Result<TerminalConfig, TerminalError> {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => TerminalConfig::default().validate(),
    }
}
