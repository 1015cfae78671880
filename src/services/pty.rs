/// PTY Service
/// Spawns shell processes on pseudo-terminals and reports their output
/// and exit back to the owning event loop.

use crate::error::TerminalError;
use crate::models::SessionId;
#[cfg(windows)]
use portable_pty::ChildKiller;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Notification from a process reader thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Output {
        session: SessionId,
        generation: u32,
        data: Vec<u8>,
    },
    /// The PTY reached EOF: the shell exited
    Exited { session: SessionId, generation: u32 },
}

impl SessionEvent {
    pub fn session(&self) -> SessionId {
        match self {
            SessionEvent::Output { session, .. } | SessionEvent::Exited { session, .. } => *session,
        }
    }

    pub fn generation(&self) -> u32 {
        match self {
            SessionEvent::Output { generation, .. } | SessionEvent::Exited { generation, .. } => {
                *generation
            }
        }
    }
}

/// Everything needed to start one shell process
#[derive(Debug, Clone)]
pub struct SpawnRequest<'a> {
    pub session: SessionId,
    /// Bumped on every respawn so stale events can be told apart
    pub generation: u32,
    pub shell: &'a str,
    pub cwd: &'a Path,
    pub cols: u16,
    pub rows: u16,
    pub env: &'a BTreeMap<String, String>,
}

/// A running shell attached to the panel
pub trait ShellProcess: Send {
    fn write(&mut self, data: &[u8]) -> Result<(), TerminalError>;

    fn resize(&mut self, cols: u16, rows: u16) -> Result<(), TerminalError>;

    fn process_id(&self) -> Option<u32>;

    /// Reap the child if it has exited, returning its exit code.
    fn try_wait(&mut self) -> Option<u32>;

    /// Signal the process group to exit without blocking the caller.
    /// Escalation to SIGKILL and reaping finish in the background.
    fn terminate(&mut self);

    /// Block until a previous `terminate` has reaped the child.
    fn wait_terminated(&mut self) {}
}

/// Starts shell processes. The native implementation uses a real PTY;
/// hosts and tests can substitute their own.
pub trait ShellSpawner {
    fn spawn(
        &mut self,
        request: &SpawnRequest<'_>,
        events: Sender<SessionEvent>,
    ) -> Result<Box<dyn ShellProcess>, TerminalError>;
}

/// Spawner backed by the platform PTY
#[derive(Debug, Default)]
pub struct NativeSpawner;

impl ShellSpawner for NativeSpawner {
    fn spawn(
        &mut self,
        request: &SpawnRequest<'_>,
        events: Sender<SessionEvent>,
    ) -> Result<Box<dyn ShellProcess>, TerminalError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: request.rows,
                cols: request.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TerminalError::Pty(e.to_string()))?;

        let mut cmd = CommandBuilder::new(request.shell);
        cmd.cwd(request.cwd);

        // Set environment variables for proper terminal
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        for (key, value) in request.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| TerminalError::Spawn(format!("{}: {}", request.shell, e)))?;

        // Release slave so the reader sees EOF when the child exits
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| TerminalError::Pty(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| TerminalError::Pty(e.to_string()))?;

        let session = request.session;
        let generation = request.generation;
        log::info!(
            "Spawned {} for {} (pid {:?}, generation {})",
            request.shell,
            session,
            child.process_id(),
            generation
        );

        thread::Builder::new()
            .name(format!("pty-reader-{}", session.0))
            .spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            let event = SessionEvent::Output {
                                session,
                                generation,
                                data: buf[..n].to_vec(),
                            };
                            if events.send(event).is_err() {
                                // multiplexer is gone
                                return;
                            }
                        }
                        Err(e) => {
                            log::debug!("PTY read error on {}: {}", session, e);
                            break;
                        }
                    }
                }
                let _ = events.send(SessionEvent::Exited {
                    session,
                    generation,
                });
            })
            .map_err(TerminalError::Io)?;

        Ok(Box::new(PtyProcess {
            master: pair.master,
            writer,
            child: Some(child),
            reaped: false,
            reaper: None,
        }))
    }
}

/// Time a shell gets to exit after SIGTERM before its group is killed
pub const KILL_GRACE: Duration = Duration::from_millis(100);

pub struct PtyProcess {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    /// Moved to the reaper thread by `terminate`
    child: Option<Box<dyn Child + Send + Sync>>,
    reaped: bool,
    reaper: Option<JoinHandle<()>>,
}

impl ShellProcess for PtyProcess {
    fn write(&mut self, data: &[u8]) -> Result<(), TerminalError> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<(), TerminalError> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TerminalError::Pty(e.to_string()))
    }

    fn process_id(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.process_id())
    }

    fn try_wait(&mut self) -> Option<u32> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                self.reaped = true;
                Some(status.exit_code())
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("Failed to poll shell exit status: {}", e);
                None
            }
        }
    }

    fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if self.reaped {
            return;
        }
        let pid = child.process_id();

        // Kill process group (shell + all descendants)
        #[cfg(unix)]
        if let Some(pid) = pid {
            unsafe {
                // Send SIGTERM first for graceful shutdown
                libc::kill(-(pid as i32), libc::SIGTERM);
            }
        }

        #[cfg(windows)]
        {
            let _ = child.kill();
        }

        // escalation and reaping happen off the owner thread
        let spawned = thread::Builder::new()
            .name(format!("pty-reaper-{}", pid.unwrap_or(0)))
            .spawn(move || {
                thread::sleep(KILL_GRACE);
                #[cfg(unix)]
                if let (Ok(None), Some(pid)) = (child.try_wait(), pid) {
                    unsafe {
                        libc::kill(-(pid as i32), libc::SIGKILL);
                    }
                }
                // Wait for child to prevent zombies
                let _ = child.wait();
            });
        match spawned {
            Ok(handle) => self.reaper = Some(handle),
            Err(e) => log::error!("Failed to start reaper for pid {:?}: {}", pid, e),
        }
    }

    fn wait_terminated(&mut self) {
        if let Some(handle) = self.reaper.take() {
            let _ = handle.join();
        }
    }
}
