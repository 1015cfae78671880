/// Commands module
/// Built-in commands and the router that decides whether a submitted
/// line runs in-process or goes to the shell.
///
/// Every handler writes its output through the multiplexer and returns
/// `Err` only for failures the user should see as `<name>: <message>`.

pub mod fs;
pub mod shell;
pub mod system;

use crate::error::CommandResult;
use crate::services::lexer::{self, SplitError};
use crate::services::SessionMultiplexer;
use std::collections::BTreeMap;

pub type CommandHandler = fn(&mut SessionMultiplexer, &[String]) -> CommandResult;

/// Grouping used by `help`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    FileSystem,
    SystemInfo,
    Shell,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::FileSystem, Category::SystemInfo, Category::Shell];

    pub fn label(self) -> &'static str {
        match self {
            Category::FileSystem => "File System",
            Category::SystemInfo => "System Info",
            Category::Shell => "Shell",
        }
    }
}

#[derive(Clone)]
pub struct BuiltinCommand {
    pub name: &'static str,
    pub description: &'static str,
    pub category: Category,
    pub handler: CommandHandler,
}

impl std::fmt::Debug for BuiltinCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinCommand")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish()
    }
}

/// Name -> built-in table, fixed once the panel is constructed
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, BuiltinCommand>,
    /// Registration order, which is also the `help` listing order
    order: Vec<&'static str>,
}

impl CommandRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The full built-in set of the HUD terminal.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        // Shell
        registry.register("help", "Show available commands", Category::Shell, shell::help);
        registry.register("clear", "Clear the screen", Category::Shell, shell::clear);
        registry.register("echo", "Display text", Category::Shell, shell::echo);
        registry.register("history", "Show command history", Category::Shell, shell::history);
        registry.register("version", "Show OS version", Category::Shell, shell::version);
        registry.register("exit", "Exit the shell", Category::Shell, shell::exit);
        registry.register("sleep", "Sleep for milliseconds", Category::Shell, shell::sleep);
        // File system
        registry.register("ls", "List files in directory", Category::FileSystem, fs::ls);
        registry.register("cat", "Display file contents", Category::FileSystem, fs::cat);
        registry.register("rm", "Delete a file", Category::FileSystem, fs::rm);
        registry.register("pwd", "Show current directory", Category::FileSystem, fs::pwd);
        registry.register("cd", "Change current directory", Category::FileSystem, fs::cd);
        registry.register("mkdir", "Create a directory", Category::FileSystem, fs::mkdir);
        registry.register("write", "Create/edit a file", Category::FileSystem, fs::write);
        // System info
        registry.register("meminfo", "Display memory usage", Category::SystemInfo, system::meminfo);
        registry.register("ps", "List running processes", Category::SystemInfo, system::ps);
        registry.register("kill", "Terminate a process", Category::SystemInfo, system::kill);
        registry.register("diag", "Run system diagnostics", Category::SystemInfo, system::diag);
        registry
    }

    /// Add or replace a built-in.
    pub fn register(
        &mut self,
        name: &'static str,
        description: &'static str,
        category: Category,
        handler: CommandHandler,
    ) {
        let command = BuiltinCommand {
            name,
            description,
            category,
            handler,
        };
        if self.commands.insert(name, command).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&BuiltinCommand> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Built-ins in registration order
    pub fn iter(&self) -> impl Iterator<Item = &BuiltinCommand> {
        self.order.iter().filter_map(|name| self.commands.get(name))
    }

    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &BuiltinCommand> {
        self.iter().filter(move |c| c.category == category)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn longest_name(&self) -> usize {
        self.commands.keys().map(|name| name.len()).max().unwrap_or(0)
    }
}

/// Where a submitted line goes
#[derive(Debug)]
pub enum Route {
    /// Blank line
    Nothing,
    Builtin {
        name: String,
        args: Vec<String>,
        handler: CommandHandler,
    },
    /// Forward the original line to the shell
    Shell,
}

/// Classify a line against the registry.
pub fn route(line: &str, registry: &CommandRegistry) -> Result<Route, SplitError> {
    let mut words = lexer::split(line)?;
    if words.is_empty() {
        return Ok(Route::Nothing);
    }
    let name = words.remove(0);
    Ok(match registry.get(&name) {
        Some(command) => Route::Builtin {
            handler: command.handler,
            name,
            args: words,
        },
        None => Route::Shell,
    })
}
