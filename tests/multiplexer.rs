// Session multiplexer behaviour against a scripted shell backend.

mod common;

use common::harness::{panel, panel_with, panel_with_registry};
use hextrix_terminal_lib::commands::Category;
use hextrix_terminal_lib::error::CommandResult;
use hextrix_terminal_lib::{
    CommandError, CommandRegistry, HistoryDirection, SessionEvent, SessionId, SessionMultiplexer,
    SessionState, TerminalError,
};
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn fresh_panel_has_one_running_tab() {
    let p = panel();
    assert_eq!(p.mux.session_count(), 1);
    assert_eq!(p.mux.active_index(), 0);
    assert_eq!(p.mux.active_session().title(), "Terminal");
    assert_eq!(p.mux.active_session().state(), &SessionState::Running);
    assert!(p.mux.history().is_empty());
    assert_eq!(p.mux.font_size(), 12);

    let shells = p.shells.lock();
    assert_eq!(shells.spawns.len(), 1);
    assert_eq!(shells.spawns[0].shell, "/bin/fake-sh");
    assert_eq!(shells.spawns[0].cwd, p.home.path());
    assert_eq!((shells.spawns[0].cols, shells.spawns[0].rows), (80, 24));
}

#[test]
fn end_to_end_session() {
    let mut p = panel();

    p.mux.submit("echo hello");
    assert!(p.screen().ends_with("hello\n"), "screen: {:?}", p.screen());
    assert_eq!(p.mux.history().entries(), vec!["echo hello"]);

    p.mux.submit("echo hello");
    assert_eq!(p.mux.history().len(), 1);

    assert!(p.mux.navigate_history(HistoryDirection::Older));
    assert_eq!(p.mux.input(), "echo hello");
    assert!(!p.mux.navigate_history(HistoryDirection::Older));
    assert_eq!(p.mux.input(), "echo hello");

    p.mux.submit("ls /nonexistent");
    assert!(
        p.screen().contains("ls: '/nonexistent' not found\n"),
        "screen: {:?}",
        p.screen()
    );
    assert!(p.mux.active_session().state().is_running());
    assert_eq!(p.mux.history().len(), 2);
    assert!(p.shells.lock().writes.is_empty(), "built-ins never reach the shell");
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[test]
fn unterminated_quote_changes_nothing_but_the_display() {
    let mut p = panel();
    p.mux.submit("echo ok");
    p.mux.new_tab();
    p.mux.switch_to(0).unwrap();
    p.mux.set_input("echo 'broken");
    let before = p.screen();

    p.mux.submit("echo 'broken");
    p.mux.submit("echo oops\\");

    assert_eq!(
        p.screen(),
        format!("{before}Error: Invalid command syntax\nError: Invalid command syntax\n")
    );
    assert_eq!(p.mux.history().entries(), vec!["echo ok"]);
    assert_eq!(p.mux.session_count(), 2);
    assert_eq!(p.mux.active_index(), 0);
    assert_eq!(p.mux.input(), "echo 'broken");
    assert!(p.shells.lock().writes.is_empty());
}

static TALLY_CALLS: AtomicUsize = AtomicUsize::new(0);

fn tally(mux: &mut SessionMultiplexer, args: &[String]) -> CommandResult {
    TALLY_CALLS.fetch_add(1, Ordering::SeqCst);
    mux.write(&format!("tally got {:?}\n", args));
    Ok(())
}

fn broken(_mux: &mut SessionMultiplexer, _args: &[String]) -> CommandResult {
    Err(CommandError::Introspection("sensor offline".to_string()))
}

#[test]
fn builtins_run_once_and_never_reach_the_shell() {
    let mut registry = CommandRegistry::builtin();
    registry.register("tally", "Counts its calls", Category::Shell, tally);
    registry.register("broken", "Always fails", Category::Shell, broken);
    let mut p = panel_with_registry(registry);

    p.mux.submit(r#"tally one "two words""#);
    assert_eq!(TALLY_CALLS.load(Ordering::SeqCst), 1);
    assert!(p.screen().contains(r#"tally got ["one", "two words"]"#));

    p.mux.submit("broken");
    assert!(p.screen().ends_with("broken: sensor offline\n"));

    // the panel keeps working after a failing handler
    p.mux.submit("echo still here");
    assert!(p.screen().ends_with("still here\n"));
    assert_eq!(TALLY_CALLS.load(Ordering::SeqCst), 1);
    assert!(p.shells.lock().writes.is_empty());
}

#[test]
fn other_lines_go_to_the_shell_with_one_newline() {
    let mut p = panel();
    p.mux.submit("  git status  ");
    p.mux.submit("/bin/ls -la");
    p.mux.submit(r#"grep "a b" file.txt"#);

    assert_eq!(
        p.shells.lock().all_writes(),
        vec!["git status\n", "/bin/ls -la\n", "grep \"a b\" file.txt\n"]
    );
    assert_eq!(p.mux.history().len(), 3);
}

#[test]
fn hash_is_not_a_comment_marker() {
    let mut p = panel();
    p.mux.submit("# note");
    p.mux.submit("echo a # b");

    assert_eq!(p.shells.lock().all_writes(), vec!["# note\n"]);
    assert!(p.screen().ends_with("echo a # b\na # b\n"));
    assert_eq!(p.mux.history().len(), 2);
}

#[test]
fn blank_lines_are_ignored() {
    let mut p = panel();
    p.mux.submit("");
    p.mux.submit("   \t ");
    assert!(p.mux.history().is_empty());
    assert!(p.screen().is_empty());
    assert!(p.shells.lock().writes.is_empty());
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[test]
fn history_skips_immediate_repeats_only() {
    let mut p = panel();
    p.mux.submit("uptime");
    p.mux.submit("uptime");
    p.mux.submit("whoami");
    p.mux.submit("uptime");
    assert_eq!(p.mux.history().entries(), vec!["uptime", "whoami", "uptime"]);
}

#[test]
fn history_keeps_the_most_recent_twenty() {
    let mut p = panel();
    for i in 0..25 {
        p.mux.submit(&format!("true {i}"));
    }
    let expected: Vec<String> = (5..25).map(|i| format!("true {i}")).collect();
    assert_eq!(p.mux.history().entries(), expected);
}

#[test]
fn history_navigation_is_bounded() {
    let mut p = panel();
    assert!(!p.mux.navigate_history(HistoryDirection::Older));
    assert!(!p.mux.navigate_history(HistoryDirection::Newer));
    assert_eq!(p.mux.input(), "");

    p.mux.submit("first");
    p.mux.submit("second");
    p.mux.set_input("draft");

    // newest/new-entry position: newer is a no-op
    assert!(!p.mux.navigate_history(HistoryDirection::Newer));
    assert_eq!(p.mux.input(), "draft");

    assert!(p.mux.navigate_history(HistoryDirection::Older));
    assert_eq!(p.mux.input(), "second");
    assert!(p.mux.navigate_history(HistoryDirection::Older));
    assert_eq!(p.mux.input(), "first");
    assert!(!p.mux.navigate_history(HistoryDirection::Older));
    assert_eq!(p.mux.input(), "first");

    assert!(p.mux.navigate_history(HistoryDirection::Newer));
    assert_eq!(p.mux.input(), "second");
    assert!(!p.mux.navigate_history(HistoryDirection::Newer));
    assert_eq!(p.mux.input(), "second");
}

#[test]
fn submitting_resets_the_browse_cursor() {
    let mut p = panel();
    p.mux.submit("a");
    p.mux.submit("b");
    p.mux.navigate_history(HistoryDirection::Older);
    p.mux.navigate_history(HistoryDirection::Older);
    p.mux.submit("c");
    assert_eq!(p.mux.history().cursor(), 3);
    assert_eq!(p.mux.input(), "");

    p.mux.navigate_history(HistoryDirection::Older);
    assert_eq!(p.mux.input(), "c");
}

// ---------------------------------------------------------------------------
// Tabs
// ---------------------------------------------------------------------------

#[test]
fn closing_the_last_tab_clears_it() {
    let mut p = panel();
    let id = p.active_id();
    p.mux.submit("echo hi");
    assert!(!p.screen().is_empty());

    p.mux.close_session(0).unwrap();
    assert_eq!(p.mux.session_count(), 1);
    assert_eq!(p.active_id(), id);
    assert!(p.screen().is_empty());
    assert_eq!(p.hook.lock().cleared, vec![id]);
    assert!(p.shells.lock().terminated.is_empty());
}

#[test]
fn closing_one_of_two_tabs_kills_its_shell() {
    let mut p = panel();
    let second = p.mux.new_tab();
    assert_eq!(p.mux.session_count(), 2);
    assert_eq!(p.mux.active_index(), 1);
    assert_eq!(p.mux.active_session().title(), "Terminal 1");

    p.mux.close_session(1).unwrap();
    assert_eq!(p.mux.session_count(), 1);
    assert_eq!(p.mux.active_index(), 0);
    assert_eq!(p.shells.lock().terminated, vec![2]);

    // late output from the closed tab is dropped
    p.shells.lock().emit(second, b"late\n");
    p.mux.pump();
    assert!(!p.screen().contains("late"));
}

#[test]
fn active_tab_survives_closing_an_earlier_one() {
    let mut p = panel();
    p.mux.new_tab();
    let third = p.mux.new_tab();
    assert_eq!(p.mux.active_index(), 2);

    p.mux.close_session(0).unwrap();
    assert_eq!(p.mux.active_index(), 1);
    assert_eq!(p.active_id(), third);
}

#[test]
fn out_of_range_tabs_are_errors() {
    let mut p = panel();
    assert!(matches!(
        p.mux.close_session(5),
        Err(TerminalError::NoSuchSession(5))
    ));
    assert!(matches!(p.mux.switch_to(1), Err(TerminalError::NoSuchSession(1))));
    assert_eq!(p.mux.session_count(), 1);
}

#[test]
fn switching_routes_input_to_the_focused_tab() {
    let mut p = panel();
    p.mux.new_tab();
    p.mux.switch_to(0).unwrap();
    p.mux.submit("pwd -P");
    p.mux.switch_to(1).unwrap();
    p.mux.submit("date");

    let shells = p.shells.lock();
    assert_eq!(shells.written_to(1), "pwd -P\n");
    assert_eq!(shells.written_to(2), "date\n");
}

#[test]
fn closing_a_tab_cancels_its_timers() {
    let mut p = panel();
    p.mux.new_tab();
    p.mux.submit("sleep 60000");
    assert_eq!(p.mux.pending_timers(), 1);

    p.mux.close_session(1).unwrap();
    assert_eq!(p.mux.pending_timers(), 0);
}

// ---------------------------------------------------------------------------
// Process lifecycle
// ---------------------------------------------------------------------------

#[test]
fn exited_shell_is_replaced_before_the_next_line() {
    let mut p = panel();
    let id = p.active_id();
    p.shells.lock().exit(id);

    p.mux.submit("whoami");

    let shells = p.shells.lock();
    let spawns = shells.spawns_for(id);
    assert_eq!(spawns.len(), 2, "respawned into the same tab");
    assert!(spawns[1].generation > spawns[0].generation);
    assert_eq!(shells.written_to(1), "");
    assert_eq!(shells.written_to(2), "whoami\n");
    drop(shells);

    assert_eq!(p.mux.session_count(), 1);
    assert_eq!(p.active_id(), id);
    assert_eq!(p.mux.active_session().spawn_count(), 2);
    assert!(p.mux.active_session().state().is_running());
}

#[test]
fn exited_shells_are_reaped_after_respawn() {
    let mut p = panel_with(|_| {}, |shells| shells.reap_after = 2);
    let id = p.active_id();
    p.shells.lock().exit(id);

    p.mux.pump();
    assert_eq!(p.shells.lock().spawns.len(), 2);
    assert!(p.shells.lock().reaped.is_empty(), "status not ready yet");

    p.mux.pump();
    assert_eq!(p.shells.lock().reaped, vec![1]);

    // nothing left to collect at shutdown
    drop(p.mux);
    assert_eq!(p.shells.lock().terminated, vec![2]);
}

#[test]
fn unreaped_shells_are_terminated_at_shutdown() {
    let mut p = panel_with(|_| {}, |shells| shells.reap_after = 100);
    let id = p.active_id();
    p.shells.lock().exit(id);
    p.mux.pump();

    p.mux.close_all();
    let mut terminated = p.shells.lock().terminated.clone();
    terminated.sort();
    assert_eq!(terminated, vec![1, 2]);
}

#[test]
fn stale_and_foreign_events_are_ignored() {
    let mut p = panel();
    let id = p.active_id();
    p.shells.lock().exit(id);
    p.mux.pump();
    assert_eq!(p.shells.lock().spawns.len(), 2);

    // exit of the process that was already replaced
    p.shells.lock().send_raw(SessionEvent::Exited {
        session: id,
        generation: 1,
    });
    p.shells.lock().send_raw(SessionEvent::Output {
        session: SessionId(99),
        generation: 1,
        data: b"ghost".to_vec(),
    });
    p.mux.pump();

    assert_eq!(p.shells.lock().spawns.len(), 2);
    assert!(!p.screen().contains("ghost"));
}

#[test]
fn shell_output_reaches_display_and_hook() {
    let mut p = panel();
    let id = p.active_id();
    p.shells.lock().emit(id, b"user@hextrix:~$ ");
    // UTF-8 split across two reads
    p.shells.lock().emit(id, b"caf\xc3");
    p.shells.lock().emit(id, b"\xa9\n");

    assert!(p.mux.pump());
    assert_eq!(p.screen(), "user@hextrix:~$ caf\u{e9}\n");

    let hook = p.hook.lock();
    let seen: String = hook
        .output
        .iter()
        .filter(|(s, _)| *s == id)
        .map(|(_, t)| t.as_str())
        .collect();
    assert_eq!(seen, "user@hextrix:~$ caf\u{e9}\n");
}

#[test]
fn split_character_after_a_bad_byte_is_kept() {
    let mut p = panel();
    let id = p.active_id();
    p.shells.lock().emit(id, b"a\xffb\xe2\x9c");
    p.shells.lock().emit(id, b"\x93\n");

    p.mux.pump();
    assert_eq!(p.screen(), "a\u{fffd}b\u{2713}\n");
}

#[test]
fn spawn_failure_leaves_a_failed_tab() {
    let mut p = panel_with(|_| {}, |shells| shells.fail_next = 1);
    let id = p.active_id();

    match p.mux.active_session().state() {
        SessionState::Failed { reason } => assert!(reason.contains("Failed to spawn shell")),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert!(p.screen().contains("/bin/fake-sh: No such file or directory"));
    assert_eq!(p.hook.lock().failures.len(), 1);
    assert_eq!(p.hook.lock().failures[0].0, id);

    // next line retries the spawn and is delivered
    p.mux.submit("uptime");
    assert!(p.mux.active_session().state().is_running());
    assert_eq!(p.shells.lock().all_writes(), vec!["uptime\n"]);
}

#[test]
fn input_to_a_dead_shell_is_reported() {
    let mut p = panel_with(|_| {}, |shells| shells.fail_next = usize::MAX);

    p.mux.submit("uptime");
    assert!(p.screen().contains("Shell is not running: Failed to spawn shell"));
    assert_eq!(p.hook.lock().failures.len(), 2);

    // built-ins still work without a shell
    p.mux.submit("echo alive");
    assert!(p.screen().ends_with("alive\n"));
}

#[test]
fn respawn_failure_marks_the_tab_failed() {
    let mut p = panel();
    let id = p.active_id();
    p.shells.lock().fail_next = 1;
    p.shells.lock().exit(id);
    p.mux.pump();

    assert!(matches!(
        p.mux.active_session().state(),
        SessionState::Failed { .. }
    ));
    assert_eq!(p.mux.session_count(), 1);
}

#[test]
fn resize_applies_to_running_and_future_shells() {
    let mut p = panel();
    p.mux.resize(132, 43);
    p.mux.new_tab();

    let shells = p.shells.lock();
    assert_eq!(shells.resizes, vec![(1, 132, 43)]);
    assert_eq!((shells.spawns[1].cols, shells.spawns[1].rows), (132, 43));
}

#[test]
fn dropping_the_panel_terminates_every_shell() {
    let p = panel();
    let shells = p.shells.clone();
    let mut mux = p.mux;
    mux.new_tab();
    drop(mux);

    let mut terminated = shells.lock().terminated.clone();
    terminated.sort();
    assert_eq!(terminated, vec![1, 2]);
}

// ---------------------------------------------------------------------------
// Font and snapshot
// ---------------------------------------------------------------------------

#[test]
fn font_size_is_clamped() {
    let mut p = panel();
    for _ in 0..30 {
        p.mux.set_font_size(1);
    }
    assert_eq!(p.mux.font_size(), 24);
    assert_eq!(p.mux.set_font_size(1), 24);
    assert_eq!(p.hook.lock().fonts.len(), 12, "only real changes are reported");

    for _ in 0..30 {
        p.mux.set_font_size(-1);
    }
    assert_eq!(p.mux.font_size(), 6);
    assert_eq!(p.mux.set_font_size(-1), 6);
    assert_eq!(p.mux.set_font_size(-100), 6);
}

#[test]
fn configured_font_is_clamped_too() {
    let p = panel_with(|config| config.font_size = 2, |_| {});
    assert_eq!(p.mux.font_size(), 6);
}

#[test]
fn snapshot_serializes_panel_state() {
    let mut p = panel();
    p.mux.new_tab();
    p.mux.submit("uptime");
    p.mux.set_input("draft");

    let json = serde_json::to_value(p.mux.snapshot()).unwrap();
    assert_eq!(json["active"], 1);
    assert_eq!(json["font_size"], 12);
    assert_eq!(json["input"], "draft");
    assert_eq!(json["history"][0], "uptime");
    assert_eq!(json["sessions"].as_array().unwrap().len(), 2);
    assert_eq!(json["sessions"][1]["title"], "Terminal 1");
    assert_eq!(json["sessions"][1]["state"], "running");
    assert_eq!(json["sessions"][1]["active"], true);
}

#[test]
fn snapshot_screen_is_plain_text() {
    let mut p = panel();
    let id = p.active_id();
    p.shells.lock().emit(id, b"\x1b[1;32mok\x1b[0m done\n");
    p.mux.pump();

    let json = serde_json::to_value(p.mux.snapshot()).unwrap();
    assert_eq!(json["screen"], "ok done\n");
}
