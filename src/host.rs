/// Line host
/// Drives a `SessionMultiplexer` from stdin/stdout. Plain lines are
/// submitted to the panel; lines starting with `:` control tabs and fonts.

use crate::config::{self, TerminalConfig};
use crate::error::TerminalError;
use crate::models::SessionId;
use crate::services::{DisplayHook, HistoryDirection, NativeSpawner, SessionMultiplexer};
use clap::Parser;
use parking_lot::Mutex;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(25);

const META_HELP: &str = "\
Meta commands:
  :new           open a tab
  :close [n]     close tab n (default: active)
  :tab n         focus tab n and replay its output
  :up / :down    recall older / newer history
  :font +|-      grow or shrink the font
  :size C R      resize every tab to C columns, R rows
  :status        print panel state as JSON
  :quit          close every shell and exit
";

#[derive(Parser, Debug)]
#[command(name = "hextrix-terminal")]
#[command(author, version)]
#[command(about = "Hextrix OS HUD terminal panel on stdin/stdout")]
#[command(after_help = META_HELP)]
pub struct Cli {
    /// Config file (default: $HEXTRIX_TERMINAL_CONFIG or ~/.hextrix/terminal.json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Shell for every tab, overriding the config file
    #[arg(short, long)]
    pub shell: Option<String>,
}

/// Host-side controls, written as `:name args`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Meta {
    New,
    Close(Option<usize>),
    Tab(usize),
    Up,
    Down,
    Font(i32),
    Size(u16, u16),
    Status,
    Help,
    Quit,
}

impl Meta {
    /// Parse a `:`-prefixed line. `None` when the line is meant for the panel.
    pub fn parse(line: &str) -> Option<Result<Meta, String>> {
        let rest = line.trim().strip_prefix(':')?;
        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or("");
        let args: Vec<&str> = words.collect();

        let index = |word: &str| {
            word.parse::<usize>()
                .map_err(|_| format!("'{}' is not a tab number", word))
        };

        let meta = match (name, args.as_slice()) {
            ("new", []) => Ok(Meta::New),
            ("close", []) => Ok(Meta::Close(None)),
            ("close", [n]) => index(*n).map(|n| Meta::Close(Some(n))),
            ("tab", [n]) => index(*n).map(Meta::Tab),
            ("up", []) => Ok(Meta::Up),
            ("down", []) => Ok(Meta::Down),
            ("font", ["+"]) => Ok(Meta::Font(1)),
            ("font", ["-"]) => Ok(Meta::Font(-1)),
            ("size", [cols, rows]) => match (cols.parse(), rows.parse()) {
                (Ok(cols), Ok(rows)) => Ok(Meta::Size(cols, rows)),
                _ => Err(format!("invalid size {}x{}", cols, rows)),
            },
            ("status", []) => Ok(Meta::Status),
            ("help", []) => Ok(Meta::Help),
            ("quit", []) | ("q", []) => Ok(Meta::Quit),
            _ => Err(format!("unknown meta command ':{}' (try :help)", rest.trim())),
        };
        Some(meta)
    }
}

/// Prints the focused tab's output to stdout.
pub struct StdoutHook {
    /// `None` until the host knows which tab is focused; everything prints then.
    focused: Arc<Mutex<Option<SessionId>>>,
}

impl StdoutHook {
    pub fn new(focused: Arc<Mutex<Option<SessionId>>>) -> Self {
        Self { focused }
    }

    fn is_focused(&self, session: SessionId) -> bool {
        let focused = *self.focused.lock();
        focused.map_or(true, |id| id == session)
    }
}

impl DisplayHook for StdoutHook {
    fn output(&mut self, session: SessionId, text: &str) {
        if self.is_focused(session) {
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }
    }

    fn cleared(&mut self, session: SessionId) {
        if self.is_focused(session) {
            print!("\x1b[2J\x1b[H");
            let _ = io::stdout().flush();
        }
    }

    fn font_changed(&mut self, size: u8) {
        println!("[font size {}]", size);
    }

    fn session_failed(&mut self, session: SessionId, error: &TerminalError) {
        eprintln!("[{} failed: {}]", session, error);
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Load the config file, then apply command-line overrides.
pub fn resolve_config(cli: &Cli) -> Result<TerminalConfig, TerminalError> {
    let mut config = match cli.config.clone().or_else(config::config_path) {
        Some(path) => config::load_config_from(&path)?,
        None => TerminalConfig::default().validate()?,
    };
    if let Some(shell) = &cli.shell {
        config.shell = Some(shell.clone());
    }
    Ok(config)
}

pub fn run_host(cli: Cli) -> Result<(), TerminalError> {
    let config = resolve_config(&cli)?;
    let focused = Arc::new(Mutex::new(None));
    let hook = StdoutHook::new(focused.clone());
    let mut mux = SessionMultiplexer::new(config, Box::new(NativeSpawner), Box::new(hook));
    *focused.lock() = Some(mux.active_session().id());

    let (line_tx, line_rx) = mpsc::channel::<String>();
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("stdin read failed: {}", e);
                        break;
                    }
                }
            }
        })?;

    log::info!("Terminal panel ready ({} built-ins)", mux.commands().len());

    'run: loop {
        mux.wait(TICK);
        loop {
            match line_rx.try_recv() {
                Ok(line) => {
                    if let Flow::Quit = handle_line(&mut mux, &focused, &line) {
                        break 'run;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::info!("stdin closed");
                    break 'run;
                }
            }
        }
    }

    log::info!("Shutting down - cleaning up shell processes");
    mux.close_all();
    Ok(())
}

fn handle_line(mux: &mut SessionMultiplexer, focused: &Mutex<Option<SessionId>>, line: &str) -> Flow {
    let meta = match Meta::parse(line) {
        None => {
            mux.submit(line);
            return Flow::Continue;
        }
        Some(Err(message)) => {
            eprintln!("{}", message);
            return Flow::Continue;
        }
        Some(Ok(meta)) => meta,
    };

    match meta {
        Meta::New => {
            mux.new_tab();
            focus(mux, focused, false);
        }
        Meta::Close(index) => {
            let index = index.unwrap_or_else(|| mux.active_index());
            match mux.close_session(index) {
                Ok(()) => focus(mux, focused, true),
                Err(e) => eprintln!("{}", e),
            }
        }
        Meta::Tab(index) => match mux.switch_to(index) {
            Ok(()) => focus(mux, focused, true),
            Err(e) => eprintln!("{}", e),
        },
        Meta::Up | Meta::Down => {
            let direction = if meta == Meta::Up {
                HistoryDirection::Older
            } else {
                HistoryDirection::Newer
            };
            mux.navigate_history(direction);
            println!("> {}", mux.input());
        }
        Meta::Font(delta) => {
            mux.set_font_size(delta);
        }
        Meta::Size(cols, rows) => mux.resize(cols, rows),
        Meta::Status => match serde_json::to_string_pretty(&mux.snapshot()) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("status unavailable: {}", e),
        },
        Meta::Help => print!("{}", META_HELP),
        Meta::Quit => return Flow::Quit,
    }
    Flow::Continue
}

/// Point the stdout hook at the active tab, optionally replaying its scrollback.
fn focus(mux: &SessionMultiplexer, focused: &Mutex<Option<SessionId>>, replay: bool) {
    let session = mux.active_session();
    *focused.lock() = Some(session.id());
    println!("[tab {}: {}]", mux.active_index(), session.title());
    if replay {
        print!("{}", session.display().contents());
        let _ = io::stdout().flush();
    }
}
