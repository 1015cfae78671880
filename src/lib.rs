//! Hextrix OS HUD terminal panel
//!
//! Multiplexes PTY-backed shell sessions into tabs, keeps them alive across
//! shell exits, and routes each submitted line either to an in-process
//! built-in or to the active shell. `host` drives the panel from
//! stdin/stdout; GUI hosts construct a `SessionMultiplexer` directly and
//! observe it through a `DisplayHook`.

pub mod commands;
pub mod config;
pub mod error;
pub mod host;
pub mod models;
pub mod services;

use clap::Parser;
use env_logger::Env;
use host::Cli;

pub use commands::{CommandRegistry, Route};
pub use config::TerminalConfig;
pub use error::{CommandError, TerminalError};
pub use models::{PanelSnapshot, SessionId, SessionInfo, SessionState};
pub use services::{
    CommandHistory, Display, DisplayHook, HistoryDirection, NativeSpawner, NullHook,
    SessionEvent, SessionMultiplexer, ShellProcess, ShellSpawner, SpawnRequest,
};

pub fn run() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = host::run_host(cli) {
        log::error!("Terminal panel failed: {}", e);
        eprintln!("hextrix-terminal: {}", e);
        std::process::exit(1);
    }
}
