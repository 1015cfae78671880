/// Services module
/// Session supervision, history, display and host introspection.
/// Separated from the commands module, which only decides what a line does.

pub mod display;
pub mod history;
pub mod lexer;
pub mod multiplexer;
pub mod pty;
pub mod scheduler;
pub mod sysinfo;

pub use display::{Display, DisplayHook, NullHook};
pub use history::{CommandHistory, HistoryDirection};
pub use multiplexer::{Session, SessionMultiplexer};
pub use pty::{NativeSpawner, SessionEvent, ShellProcess, ShellSpawner, SpawnRequest};
