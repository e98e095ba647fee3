//! Commands registered by plugins and dispatched by the lifecycle engine.
//!
//! A command is a named async handler, optionally reachable through one
//! alias. Aliases resolve a single level: an alias pointing at another alias
//! does not resolve.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{HooklineError, Result};
use crate::hooks::HookRunner;

/// Parsed command-line operands.
///
/// Serializes with positionals under `_` and options flattened alongside,
/// the shape hook handlers see in `onStart` args.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandArgs {
    #[serde(rename = "_", default)]
    pub positionals: Vec<String>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl CommandArgs {
    pub fn new<I, S>(positionals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            positionals: positionals.into_iter().map(Into::into).collect(),
            options: Map::new(),
        }
    }

    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Split raw tokens into positionals and options.
    ///
    /// `--key=value` becomes a string option, `--flag` becomes `true`,
    /// `--no-flag` becomes `false`. Everything after a bare `--` is
    /// positional.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = Self::default();
        let mut options_done = false;

        for token in tokens.into_iter().map(Into::into) {
            if options_done {
                args.positionals.push(token);
                continue;
            }
            if token == "--" {
                options_done = true;
                continue;
            }
            match token.strip_prefix("--") {
                Some(option) if !option.is_empty() => match option.split_once('=') {
                    Some((key, value)) => {
                        args.options
                            .insert(key.to_string(), Value::String(value.to_string()));
                    }
                    None => match option.strip_prefix("no-") {
                        Some(negated) if !negated.is_empty() => {
                            args.options.insert(negated.to_string(), Value::Bool(false));
                        }
                        _ => {
                            args.options.insert(option.to_string(), Value::Bool(true));
                        }
                    },
                },
                _ => args.positionals.push(token),
            }
        }

        args
    }

    /// Drop a leading positional equal to the command name.
    pub fn strip_command(&mut self, name: &str) {
        if self.positionals.first().map(String::as_str) == Some(name) {
            self.positionals.remove(0);
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Everything a command handler receives.
#[derive(Clone)]
pub struct CommandContext {
    pub args: CommandArgs,
    /// Frozen hooks, enable policy and plugin methods for run-time use.
    pub hooks: HookRunner,
}

/// Type-erased async command handler.
pub type CommandHandler =
    Arc<dyn Fn(CommandContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Wrap an async closure as a [`CommandHandler`].
pub fn command_fn<F, Fut>(f: F) -> CommandHandler
where
    F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// A named command.
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub alias: Option<String>,
    pub description: Option<String>,
    pub details: Option<String>,
    pub handler: CommandHandler,
}

impl Command {
    pub fn new(name: impl Into<String>, handler: CommandHandler) -> Self {
        Self {
            name: name.into(),
            alias: None,
            description: None,
            details: None,
            handler,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("description", &self.description)
            .finish()
    }
}

#[derive(Debug, Clone)]
enum CommandSlot {
    Command(Command),
    Alias(String),
}

/// Command name (or alias) to command.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    slots: HashMap<String, CommandSlot>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command and its alias.
    ///
    /// Fails if the name is already taken by a command or an alias. An alias
    /// may take over an existing name; the takeover is logged.
    pub fn register(&mut self, command: Command) -> Result<()> {
        if self.slots.contains_key(&command.name) {
            return Err(HooklineError::DuplicateRegistration(format!(
                "api.registerCommand() failed, the command {} is exists",
                command.name
            )));
        }

        let name = command.name.clone();
        let alias = command.alias.clone();
        info!(command = %name, alias = ?alias, "Registered command");
        self.slots.insert(name.clone(), CommandSlot::Command(command));

        if let Some(alias) = alias {
            if self.slots.contains_key(&alias) {
                warn!(command = %name, alias = %alias, "Command alias shadows an existing entry");
            }
            self.slots.insert(alias, CommandSlot::Alias(name));
        }

        Ok(())
    }

    /// Resolve a name, following at most one alias.
    pub fn resolve(&self, name: &str) -> Option<&Command> {
        match self.slots.get(name)? {
            CommandSlot::Command(command) => Some(command),
            CommandSlot::Alias(target) => match self.slots.get(target)? {
                CommandSlot::Command(command) => Some(command),
                CommandSlot::Alias(_) => None,
            },
        }
    }

    /// Whether `name` is taken by a command or alias.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Registered commands (not aliases), sorted by name.
    pub fn list(&self) -> Vec<&Command> {
        let mut commands: Vec<&Command> = self
            .slots
            .values()
            .filter_map(|slot| match slot {
                CommandSlot::Command(command) => Some(command),
                CommandSlot::Alias(_) => None,
            })
            .collect();
        commands.sort_by(|a, b| a.name.cmp(&b.name));
        commands
    }
}
