/// File system built-ins
/// ls, cat, rm, pwd, cd, mkdir, write
///
/// Relative paths resolve against the panel's built-in working directory,
/// which is separate from the working directory of each tab's shell.

use crate::error::{CommandError, CommandResult};
use crate::services::lexer;
use crate::services::SessionMultiplexer;
use std::fs;
use std::process::Command;

pub fn ls(mux: &mut SessionMultiplexer, args: &[String]) -> CommandResult {
    let target = args.first().map(String::as_str).unwrap_or(".");
    let path = mux.resolve_path(target);
    if !path.exists() {
        return Err(CommandError::NotFound(target.to_string()));
    }

    let output = Command::new("ls")
        .arg("-la")
        .arg(&path)
        .current_dir(mux.cwd())
        .env("LC_ALL", "C")
        .output()?;

    if output.status.success() {
        mux.write(&String::from_utf8_lossy(&output.stdout));
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(CommandError::Introspection(if stderr.is_empty() {
            format!("ls exited with {}", output.status)
        } else {
            stderr
        }))
    }
}

pub fn cat(mux: &mut SessionMultiplexer, args: &[String]) -> CommandResult {
    let Some(name) = args.first() else {
        mux.write("Usage: cat <filename>\n");
        return Ok(());
    };
    let path = mux.resolve_path(name);
    if path.is_dir() {
        return Err(CommandError::IsADirectory(name.clone()));
    }
    let bytes = fs::read(&path).map_err(|e| CommandError::from_io(e, name))?;
    let mut content = String::from_utf8_lossy(&bytes).into_owned();
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    mux.write(&content);
    Ok(())
}

pub fn rm(mux: &mut SessionMultiplexer, args: &[String]) -> CommandResult {
    let Some(name) = args.first() else {
        mux.write("Usage: rm <filename>\n");
        return Ok(());
    };
    let path = mux.resolve_path(name);
    if path.is_dir() {
        mux.write(&format!(
            "'{}' is a directory. Use 'rm -r' in the shell to remove directories.\n",
            name
        ));
        return Ok(());
    }
    fs::remove_file(&path).map_err(|e| CommandError::from_io(e, name))?;
    log::info!("rm removed {}", path.display());
    mux.write(&format!("Deleted '{}'\n", name));
    Ok(())
}

pub fn pwd(mux: &mut SessionMultiplexer, _args: &[String]) -> CommandResult {
    let cwd = mux.cwd().display().to_string();
    mux.write(&format!("{}\n", cwd));
    Ok(())
}

pub fn cd(mux: &mut SessionMultiplexer, args: &[String]) -> CommandResult {
    let target = args.first().map(String::as_str).unwrap_or("~");
    let path = mux.resolve_path(target);
    let canonical = path
        .canonicalize()
        .map_err(|e| CommandError::from_io(e, target))?;
    if !canonical.is_dir() {
        return Err(CommandError::NotADirectory(target.to_string()));
    }
    let shown = canonical.display().to_string();
    mux.set_cwd(canonical);
    mux.write(&format!("{}\n", shown));
    Ok(())
}

pub fn mkdir(mux: &mut SessionMultiplexer, args: &[String]) -> CommandResult {
    let Some(name) = args.first() else {
        mux.write("Usage: mkdir <directory>\n");
        return Ok(());
    };
    let path = mux.resolve_path(name);
    fs::create_dir_all(&path).map_err(|e| CommandError::from_io(e, name))?;
    mux.write(&format!("Created directory '{}'\n", name));
    Ok(())
}

/// Hands the file to an editor running inside the tab's shell.
pub fn write(mux: &mut SessionMultiplexer, args: &[String]) -> CommandResult {
    let Some(name) = args.first() else {
        mux.write("Usage: write <filename>\n");
        return Ok(());
    };
    let path = mux.resolve_path(name);
    let editor = mux.config().editor_command();
    mux.write(&format!("Opening {} in {}...\n", name, editor));
    let line = format!("{} {}\n", editor, lexer::quote(&path.to_string_lossy()));
    mux.send_input(line.as_bytes());
    Ok(())
}
