/// Shell built-ins
/// help, clear, echo, history, version, exit, sleep

use super::Category;
use crate::error::{CommandError, CommandResult};
use crate::services::sysinfo;
use crate::services::SessionMultiplexer;
use std::fmt::Write as _;
use std::time::Duration;

pub fn help(mux: &mut SessionMultiplexer, args: &[String]) -> CommandResult {
    if let Some(name) = args.first() {
        let text = match mux.commands().get(name) {
            Some(command) => format!("{} - {}\n", command.name, command.description),
            None => format!("Unknown command: {}\n", name),
        };
        mux.write(&text);
        return Ok(());
    }

    let registry = mux.commands();
    let width = registry.longest_name();
    let mut text = String::from("Available commands:\n\n");
    for category in Category::ALL {
        let _ = writeln!(text, "{}:", category.label());
        for command in registry.in_category(category) {
            let _ = writeln!(
                text,
                "  {:<width$}  - {}",
                command.name,
                command.description,
                width = width
            );
        }
        text.push('\n');
    }
    text.push_str("Type 'help <command>' for more information on a specific command.\n");
    mux.write(&text);
    Ok(())
}

pub fn clear(mux: &mut SessionMultiplexer, _args: &[String]) -> CommandResult {
    mux.clear();
    Ok(())
}

pub fn echo(mux: &mut SessionMultiplexer, args: &[String]) -> CommandResult {
    mux.write(&format!("{}\n", args.join(" ")));
    Ok(())
}

pub fn history(mux: &mut SessionMultiplexer, _args: &[String]) -> CommandResult {
    if mux.history().is_empty() {
        mux.write("No command history\n");
        return Ok(());
    }
    let mut text = String::from("Command History:\n");
    for (i, line) in mux.history().iter().enumerate() {
        let _ = writeln!(text, "{}: {}", i + 1, line);
    }
    mux.write(&text);
    Ok(())
}

pub fn version(mux: &mut SessionMultiplexer, _args: &[String]) -> CommandResult {
    let os = sysinfo::os_identity();
    mux.write(&format!(
        "Hextrix OS HUD Terminal v{}\nRunning on {} {}\nEnhanced Shell with command history and tabs\n",
        env!("CARGO_PKG_VERSION"),
        os.sysname,
        os.release
    ));
    Ok(())
}

/// Resets the tab; the shell process keeps running.
pub fn exit(mux: &mut SessionMultiplexer, _args: &[String]) -> CommandResult {
    mux.write("Exiting shell...\n");
    mux.clear();
    Ok(())
}

pub fn sleep(mux: &mut SessionMultiplexer, args: &[String]) -> CommandResult {
    let Some(arg) = args.first() else {
        mux.write("Usage: sleep <milliseconds>\n");
        return Ok(());
    };
    let ms: u64 = arg.parse().map_err(|_| CommandError::InvalidDuration)?;
    mux.write(&format!("Sleeping for {} ms...\n", ms));
    mux.defer(Duration::from_millis(ms), "Done sleeping\n");
    Ok(())
}
