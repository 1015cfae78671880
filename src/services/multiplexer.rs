/// Session Multiplexer
/// Owns the terminal tabs, their shell processes, the command history and
/// the built-in command layer. Everything runs on the owner's thread; the
/// only asynchronous edges are the PTY reader threads, whose events are
/// drained by `pump`, `wait` and `submit`.

use crate::commands::{self, CommandRegistry, Route};
use crate::config::{TerminalConfig, MAX_FONT_SIZE, MIN_FONT_SIZE};
use crate::error::TerminalError;
use crate::models::{PanelSnapshot, SessionId, SessionInfo, SessionState};
use crate::services::display::{Display, DisplayHook};
use crate::services::history::{CommandHistory, HistoryDirection};
use crate::services::pty::{SessionEvent, ShellProcess, ShellSpawner, SpawnRequest};
use crate::services::scheduler::Scheduler;
use crate::services::sysinfo;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

/// One terminal tab
pub struct Session {
    id: SessionId,
    title: String,
    state: SessionState,
    process: Option<Box<dyn ShellProcess>>,
    /// Incremented on every spawn; events from older processes are ignored
    generation: u32,
    spawn_count: u32,
    display: Display,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.process_id())
    }

    pub fn spawn_count(&self) -> u32 {
        self.spawn_count
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

pub struct SessionMultiplexer {
    config: TerminalConfig,
    spawner: Box<dyn ShellSpawner>,
    hook: Box<dyn DisplayHook>,
    commands: CommandRegistry,
    sessions: Vec<Session>,
    active: usize,
    next_id: u32,
    history: CommandHistory,
    /// Unsent contents of the command entry
    input: String,
    /// Shared by every tab
    font_size: u8,
    /// Working directory of the built-in commands
    cwd: PathBuf,
    shell: String,
    home: PathBuf,
    cols: u16,
    rows: u16,
    scheduler: Scheduler,
    /// Exited shells whose status has not been collected yet
    reaping: Vec<Box<dyn ShellProcess>>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
}

impl SessionMultiplexer {
    /// Create the panel with the standard built-ins and one open tab.
    pub fn new(
        config: TerminalConfig,
        spawner: Box<dyn ShellSpawner>,
        hook: Box<dyn DisplayHook>,
    ) -> Self {
        Self::with_registry(config, spawner, hook, CommandRegistry::builtin())
    }

    pub fn with_registry(
        config: TerminalConfig,
        spawner: Box<dyn ShellSpawner>,
        hook: Box<dyn DisplayHook>,
        commands: CommandRegistry,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let home = config.home_dir();
        let cwd = std::env::current_dir().unwrap_or_else(|_| home.clone());
        let mut mux = Self {
            shell: config.shell_path(),
            history: CommandHistory::new(config.history_capacity),
            font_size: config.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE),
            cols: config.cols,
            rows: config.rows,
            home,
            cwd,
            config,
            spawner,
            hook,
            commands,
            sessions: Vec::new(),
            active: 0,
            next_id: 1,
            input: String::new(),
            scheduler: Scheduler::new(),
            reaping: Vec::new(),
            events_tx,
            events_rx,
        };
        mux.new_tab();
        mux
    }

    // ------------------------------------------------------------------
    // Tabs
    // ------------------------------------------------------------------

    /// Open a tab, start its shell and focus it.
    ///
    /// A spawn failure does not abort: the tab is kept in the `Failed`
    /// state with the error shown in its display.
    pub fn create_session(&mut self, title: &str) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.sessions.push(Session {
            id,
            title: title.to_string(),
            state: SessionState::Starting,
            process: None,
            generation: 0,
            spawn_count: 0,
            display: Display::new(self.config.scrollback_limit),
        });
        let index = self.sessions.len() - 1;
        self.active = index;
        self.spawn_into(index);
        log::info!("Tab {} opened as {} (total: {})", index, id, self.sessions.len());
        id
    }

    /// Open a tab titled after the current tab count.
    pub fn new_tab(&mut self) -> SessionId {
        let title = if self.sessions.is_empty() {
            "Terminal".to_string()
        } else {
            format!("Terminal {}", self.sessions.len())
        };
        self.create_session(&title)
    }

    /// Close the tab at `index`. The last remaining tab is cleared instead.
    pub fn close_session(&mut self, index: usize) -> Result<(), TerminalError> {
        if index >= self.sessions.len() {
            return Err(TerminalError::NoSuchSession(index));
        }
        if self.sessions.len() == 1 {
            self.clear_session(index);
            return Ok(());
        }

        let mut session = self.sessions.remove(index);
        if let Some(mut process) = session.process.take() {
            process.terminate();
        }
        self.scheduler.cancel_session(session.id);
        if self.active > index || self.active >= self.sessions.len() {
            self.active = self.active.saturating_sub(1);
        }
        log::info!("Closed {} (remaining: {})", session.id, self.sessions.len());
        Ok(())
    }

    pub fn switch_to(&mut self, index: usize) -> Result<(), TerminalError> {
        if index >= self.sessions.len() {
            return Err(TerminalError::NoSuchSession(index));
        }
        self.active = index;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    /// Route one line from the command entry.
    pub fn submit(&mut self, line: &str) {
        // a respawn for an already-delivered exit must happen before routing
        self.pump_events();

        let line = line.trim();
        if line.is_empty() {
            return;
        }
        // malformed lines leave history and input untouched
        let route = match commands::route(line, &self.commands) {
            Ok(route) => route,
            Err(e) => {
                log::debug!("Rejected {:?}: {}", line, e);
                self.write("Error: Invalid command syntax\n");
                return;
            }
        };
        self.history.push(line);
        self.input.clear();

        match route {
            Route::Nothing => {}
            Route::Builtin {
                name,
                args,
                handler,
            } => {
                self.write(&format!("{}\n", line));
                log::debug!("Built-in {} {:?}", name, args);
                if let Err(err) = handler(self, &args) {
                    self.write(&format!("{}: {}\n", name, err));
                }
            }
            Route::Shell => {
                // the PTY echoes the line itself
                self.send_input(format!("{}\n", line).as_bytes());
            }
        }
    }

    /// Recall the previous or next history entry into the command entry.
    /// Returns false when already at that end of the history.
    pub fn navigate_history(&mut self, direction: HistoryDirection) -> bool {
        match self.history.navigate(direction) {
            Some(entry) => {
                self.input = entry.to_string();
                true
            }
            None => false,
        }
    }

    /// Write raw bytes to the active tab's shell, restarting it first if it is not running.
    pub fn send_input(&mut self, data: &[u8]) {
        let index = self.active;
        if self.sessions[index].process.is_none() {
            self.spawn_into(index);
        }
        let session = &mut self.sessions[index];
        let Some(process) = session.process.as_mut() else {
            let reason = match &session.state {
                SessionState::Failed { reason } => reason.clone(),
                other => format!("{:?}", other),
            };
            self.write_to(index, &format!("Shell is not running: {}\n", reason));
            return;
        };
        if let Err(e) = process.write(data) {
            log::warn!("Write to {} failed: {}", session.id, e);
            self.write_to(index, &format!("Error: {}\n", e));
        }
    }

    // ------------------------------------------------------------------
    // Display
    // ------------------------------------------------------------------

    /// Append text to the active tab's display without routing it.
    pub fn write(&mut self, text: &str) {
        self.write_to(self.active, text);
    }

    /// Reset the active tab's display.
    pub fn clear(&mut self) {
        self.clear_session(self.active);
    }

    /// Step the shared font size by `delta`, clamped to the supported range.
    pub fn set_font_size(&mut self, delta: i32) -> u8 {
        let size = (i32::from(self.font_size) + delta)
            .clamp(i32::from(MIN_FONT_SIZE), i32::from(MAX_FONT_SIZE)) as u8;
        if size != self.font_size {
            self.font_size = size;
            log::debug!("Font size {} applied to {} tabs", size, self.sessions.len());
            self.hook.font_changed(size);
        }
        self.font_size
    }

    /// Resize every tab's PTY; new tabs start at this size too.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        if cols == 0 || rows == 0 || (cols == self.cols && rows == self.rows) {
            return;
        }
        self.cols = cols;
        self.rows = rows;
        for session in &mut self.sessions {
            if let Some(process) = session.process.as_mut() {
                if let Err(e) = process.resize(cols, rows) {
                    log::warn!("Failed to resize {}: {}", session.id, e);
                }
            }
        }
    }

    fn write_to(&mut self, index: usize, text: &str) {
        if let Some(session) = self.sessions.get_mut(index) {
            session.display.feed(text);
            self.hook.output(session.id, text);
        }
    }

    fn clear_session(&mut self, index: usize) {
        if let Some(session) = self.sessions.get_mut(index) {
            session.display.reset();
            self.hook.cleared(session.id);
        }
    }

    // ------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------

    /// One event-loop tick: process output, exits and due timers.
    /// Returns whether anything happened.
    pub fn pump(&mut self) -> bool {
        let mut changed = self.pump_events();
        for deferred in self.scheduler.take_due(Instant::now()) {
            if let Some(index) = self.index_of(deferred.session) {
                self.write_to(index, &deferred.message);
                changed = true;
            }
        }
        changed
    }

    /// Block up to `timeout` (or the next timer) for an event, then `pump`.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let timeout = match self.scheduler.next_deadline() {
            Some(deadline) => timeout.min(deadline.saturating_duration_since(Instant::now())),
            None => timeout,
        };
        let mut changed = match self.events_rx.recv_timeout(timeout) {
            Ok(event) => self.handle_event(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        };
        changed |= self.pump();
        changed
    }

    /// Earliest pending deferred callback
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Run `message` into the active tab after `delay`.
    pub fn defer(&mut self, delay: Duration, message: impl Into<String>) {
        let session = self.sessions[self.active].id;
        self.scheduler.schedule(delay, session, message);
    }

    fn pump_events(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.events_rx.try_recv() {
            changed |= self.handle_event(event);
        }
        self.reap_exited();
        changed
    }

    /// Drop exited shells once their status has been collected.
    fn reap_exited(&mut self) {
        self.reaping.retain_mut(|process| process.try_wait().is_none());
    }

    fn handle_event(&mut self, event: SessionEvent) -> bool {
        let Some(index) = self.index_of(event.session()) else {
            // tab was closed
            return false;
        };
        if self.sessions[index].generation != event.generation() {
            return false;
        }
        match event {
            SessionEvent::Output { data, .. } => {
                let session = &mut self.sessions[index];
                let text = session.display.feed_bytes(&data);
                if !text.is_empty() {
                    self.hook.output(session.id, &text);
                }
                true
            }
            SessionEvent::Exited { .. } => {
                let session = &mut self.sessions[index];
                if let Some(mut process) = session.process.take() {
                    match process.try_wait() {
                        Some(code) => {
                            log::info!("Shell in {} exited ({}), respawning", session.id, code)
                        }
                        None => {
                            // pty closed before the child finished exiting
                            log::info!("Shell in {} exited, respawning", session.id);
                            self.reaping.push(process);
                        }
                    }
                }
                session.state = SessionState::Exited;
                self.spawn_into(index);
                true
            }
        }
    }

    fn spawn_into(&mut self, index: usize) {
        let session = &mut self.sessions[index];
        session.generation += 1;
        session.spawn_count += 1;
        session.state = SessionState::Starting;
        let request = SpawnRequest {
            session: session.id,
            generation: session.generation,
            shell: &self.shell,
            cwd: &self.home,
            cols: self.cols,
            rows: self.rows,
            env: &self.config.env,
        };
        match self.spawner.spawn(&request, self.events_tx.clone()) {
            Ok(process) => {
                session.process = Some(process);
                session.state = SessionState::Running;
            }
            Err(err) => {
                log::error!("Failed to start shell for {}: {}", session.id, err);
                session.process = None;
                session.state = SessionState::Failed {
                    reason: err.to_string(),
                };
                let message = format!("{}\n", err);
                session.display.feed(&message);
                self.hook.output(session.id, &message);
                self.hook.session_failed(session.id, &err);
            }
        }
    }

    fn index_of(&self, id: SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| s.id == id)
    }

    /// Terminate every shell. Used on shutdown.
    pub fn close_all(&mut self) {
        let mut stopping: Vec<Box<dyn ShellProcess>> = self.reaping.drain(..).collect();
        for session in &mut self.sessions {
            if let Some(process) = session.process.take() {
                stopping.push(process);
            }
            session.state = SessionState::Exited;
        }
        for process in &mut stopping {
            process.terminate();
        }
        for process in &mut stopping {
            process.wait_terminated();
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_session(&self) -> &Session {
        &self.sessions[self.active]
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Replace the unsent command entry text (typing)
    pub fn set_input(&mut self, text: &str) {
        self.input = text.to_string();
    }

    pub fn font_size(&self) -> u8 {
        self.font_size
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn config(&self) -> &TerminalConfig {
        &self.config
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn set_cwd(&mut self, dir: PathBuf) {
        self.cwd = dir;
    }

    /// Resolve a user-supplied path against the built-in working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let expanded = if path == "~" {
            self.home.clone()
        } else if let Some(rest) = path.strip_prefix("~/") {
            self.home.join(rest)
        } else {
            PathBuf::from(path)
        };
        if expanded.is_absolute() {
            expanded
        } else {
            self.cwd.join(expanded)
        }
    }

    /// Whether `pid` is one of this panel's shells or runs beneath one.
    pub fn owns_process(&self, pid: i32) -> bool {
        self.sessions
            .iter()
            .filter_map(|s| s.pid())
            .any(|shell| sysinfo::is_descendant_of(pid, shell as i32))
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.len()
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        PanelSnapshot {
            sessions: self
                .sessions
                .iter()
                .enumerate()
                .map(|(i, s)| SessionInfo {
                    id: s.id,
                    title: s.title.clone(),
                    active: i == self.active,
                    state: s.state.clone(),
                    pid: s.pid(),
                    spawn_count: s.spawn_count,
                })
                .collect(),
            active: self.active,
            font_size: self.font_size,
            history: self.history.entries(),
            input: self.input.clone(),
            cwd: self.cwd.display().to_string(),
            screen: self.sessions[self.active].display.plain_text(),
        }
    }
}

impl Drop for SessionMultiplexer {
    fn drop(&mut self) {
        self.close_all();
    }
}
