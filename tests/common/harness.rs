// Panel construction for integration tests.

use super::fake_shell::{FakeSpawner, ShellLog};
use hextrix_terminal_lib::{
    CommandRegistry, DisplayHook, SessionId, SessionMultiplexer, TerminalConfig, TerminalError,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;

/// What the panel reported through its display hook
#[derive(Debug, Default)]
pub struct HookLog {
    pub output: Vec<(SessionId, String)>,
    pub cleared: Vec<SessionId>,
    pub fonts: Vec<u8>,
    pub failures: Vec<(SessionId, String)>,
}

#[derive(Clone, Default)]
pub struct RecordingHook {
    pub log: Arc<Mutex<HookLog>>,
}

impl DisplayHook for RecordingHook {
    fn output(&mut self, session: SessionId, text: &str) {
        self.log.lock().output.push((session, text.to_string()));
    }

    fn cleared(&mut self, session: SessionId) {
        self.log.lock().cleared.push(session);
    }

    fn font_changed(&mut self, size: u8) {
        self.log.lock().fonts.push(size);
    }

    fn session_failed(&mut self, session: SessionId, error: &TerminalError) {
        self.log.lock().failures.push((session, error.to_string()));
    }
}

pub struct Panel {
    pub mux: SessionMultiplexer,
    pub shells: Arc<Mutex<ShellLog>>,
    pub hook: Arc<Mutex<HookLog>>,
    pub home: TempDir,
}

impl Panel {
    /// Text of the active tab's display
    pub fn screen(&self) -> String {
        self.mux.active_session().display().contents().to_string()
    }

    pub fn active_id(&self) -> SessionId {
        self.mux.active_session().id()
    }
}

pub fn test_config(home: &TempDir) -> TerminalConfig {
    TerminalConfig {
        shell: Some("/bin/fake-sh".to_string()),
        home: Some(home.path().to_path_buf()),
        ..TerminalConfig::default()
    }
}

pub fn panel() -> Panel {
    build(|_| {}, CommandRegistry::builtin(), |_| {})
}

/// Panel whose config and spawner can be adjusted before the first tab opens.
pub fn panel_with(
    configure: impl FnOnce(&mut TerminalConfig),
    prepare: impl FnOnce(&mut ShellLog),
) -> Panel {
    build(configure, CommandRegistry::builtin(), prepare)
}

pub fn panel_with_registry(registry: CommandRegistry) -> Panel {
    build(|_| {}, registry, |_| {})
}

fn build(
    configure: impl FnOnce(&mut TerminalConfig),
    registry: CommandRegistry,
    prepare: impl FnOnce(&mut ShellLog),
) -> Panel {
    let home = TempDir::new().unwrap();
    let mut config = test_config(&home);
    configure(&mut config);

    let spawner = FakeSpawner::new();
    prepare(&mut *spawner.log.lock());
    let hook = RecordingHook::default();

    let mux = SessionMultiplexer::with_registry(
        config,
        Box::new(spawner.clone()),
        Box::new(hook.clone()),
        registry,
    );
    Panel {
        mux,
        shells: spawner.log,
        hook: hook.log,
        home,
    }
}
