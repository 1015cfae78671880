// Scripted stand-in for the PTY backend.
//
// Every spawn is recorded and gets a serial number (1, 2, ...). Writes,
// terminations and the event senders are kept in a shared log so tests
// can inspect what reached "the shell" and inject output or exits.

use hextrix_terminal_lib::{SessionEvent, SessionId, ShellProcess, ShellSpawner, SpawnRequest, TerminalError};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Base for synthetic PIDs, well above anything a test box runs.
pub const FAKE_PID_BASE: u32 = 3_000_000;

#[derive(Debug, Clone)]
pub struct SpawnRecord {
    pub serial: u32,
    pub session: SessionId,
    pub generation: u32,
    pub shell: String,
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
}

#[derive(Default)]
pub struct ShellLog {
    pub spawns: Vec<SpawnRecord>,
    /// (spawn serial, bytes) in write order
    pub writes: Vec<(u32, Vec<u8>)>,
    pub resizes: Vec<(u32, u16, u16)>,
    pub terminated: Vec<u32>,
    /// Number of upcoming spawns that fail
    pub fail_next: usize,
    /// PID reported by the next spawned process instead of a synthetic one
    pub next_pid: Option<u32>,
    /// Status polls each process answers "still running" before it exits
    pub reap_after: u32,
    /// Serials whose exit status has been collected
    pub reaped: Vec<u32>,
    senders: Vec<(SessionId, u32, Sender<SessionEvent>)>,
}

impl ShellLog {
    pub fn spawns_for(&self, session: SessionId) -> Vec<&SpawnRecord> {
        self.spawns.iter().filter(|s| s.session == session).collect()
    }

    /// Everything written to the process with this serial, as text.
    pub fn written_to(&self, serial: u32) -> String {
        self.writes
            .iter()
            .filter(|(s, _)| *s == serial)
            .map(|(_, data)| String::from_utf8_lossy(data).into_owned())
            .collect()
    }

    pub fn all_writes(&self) -> Vec<String> {
        self.writes
            .iter()
            .map(|(_, data)| String::from_utf8_lossy(data).into_owned())
            .collect()
    }

    fn latest(&self, session: SessionId) -> Option<&(SessionId, u32, Sender<SessionEvent>)> {
        self.senders.iter().rev().find(|(id, _, _)| *id == session)
    }

    /// Report the current process of `session` as exited.
    pub fn exit(&self, session: SessionId) {
        if let Some((id, generation, tx)) = self.latest(session) {
            tx.send(SessionEvent::Exited {
                session: *id,
                generation: *generation,
            })
            .unwrap();
        }
    }

    /// Deliver output from the current process of `session`.
    pub fn emit(&self, session: SessionId, data: &[u8]) {
        if let Some((id, generation, tx)) = self.latest(session) {
            tx.send(SessionEvent::Output {
                session: *id,
                generation: *generation,
                data: data.to_vec(),
            })
            .unwrap();
        }
    }

    /// Send an arbitrary event on any recorded channel.
    pub fn send_raw(&self, event: SessionEvent) {
        if let Some((_, _, tx)) = self.senders.first() {
            tx.send(event).unwrap();
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeSpawner {
    pub log: Arc<Mutex<ShellLog>>,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShellSpawner for FakeSpawner {
    fn spawn(
        &mut self,
        request: &SpawnRequest<'_>,
        events: Sender<SessionEvent>,
    ) -> Result<Box<dyn ShellProcess>, TerminalError> {
        let mut log = self.log.lock();
        if log.fail_next > 0 {
            log.fail_next -= 1;
            return Err(TerminalError::Spawn(format!(
                "{}: No such file or directory (os error 2)",
                request.shell
            )));
        }
        let serial = log.spawns.len() as u32 + 1;
        log.spawns.push(SpawnRecord {
            serial,
            session: request.session,
            generation: request.generation,
            shell: request.shell.to_string(),
            cwd: request.cwd.to_path_buf(),
            cols: request.cols,
            rows: request.rows,
        });
        log.senders.push((request.session, request.generation, events));
        let pid = log.next_pid.take().unwrap_or(FAKE_PID_BASE + serial);
        Ok(Box::new(FakeProcess {
            serial,
            pid,
            polls: 0,
            log: self.log.clone(),
        }))
    }
}

pub struct FakeProcess {
    serial: u32,
    pid: u32,
    polls: u32,
    log: Arc<Mutex<ShellLog>>,
}

impl ShellProcess for FakeProcess {
    fn write(&mut self, data: &[u8]) -> Result<(), TerminalError> {
        self.log.lock().writes.push((self.serial, data.to_vec()));
        Ok(())
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<(), TerminalError> {
        self.log.lock().resizes.push((self.serial, cols, rows));
        Ok(())
    }

    fn process_id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn try_wait(&mut self) -> Option<u32> {
        self.polls += 1;
        let mut log = self.log.lock();
        if self.polls <= log.reap_after {
            return None;
        }
        if !log.reaped.contains(&self.serial) {
            log.reaped.push(self.serial);
        }
        Some(0)
    }

    fn terminate(&mut self) {
        self.log.lock().terminated.push(self.serial);
    }
}
