//! Slash-command routing.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use qqbot_core::traits::HandlerError;
use regex::Regex;
use thiserror::Error;

use crate::message::GroupMessage;

/// Router build error.
#[derive(Debug, Error)]
pub enum CommandRouterError {
    #[error("Command name cannot be empty")]
    EmptyName,
    #[error("Command registered twice: {0}")]
    Duplicate(String),
    #[error("Invalid command pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// A command invoked with the text following its name.
#[async_trait]
pub trait Command: Send + Sync {
    /// Run the command for `message`.
    async fn run(&self, message: &GroupMessage, argument: &str) -> Result<(), HandlerError>;
}

/// Explicit `name -> command` table plus a fallback for everything else.
///
/// Content matching `^\s*/(name|...)\s*(.*)$` runs the named command with
/// the captured remainder; anything else runs the fallback with the full
/// content.
pub struct CommandRouter {
    commands: HashMap<String, Arc<dyn Command>>,
    pattern: Option<Regex>,
    fallback: Arc<dyn Command>,
}

impl CommandRouter {
    /// Start building a router.
    #[must_use]
    pub fn builder(fallback: Arc<dyn Command>) -> CommandRouterBuilder {
        CommandRouterBuilder {
            commands: Vec::new(),
            fallback,
        }
    }

    /// Registered command names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Split `content` into the matched command name and its argument.
    #[must_use]
    pub fn parse<'c>(&self, content: &'c str) -> Option<(&'c str, &'c str)> {
        let captures = self.pattern.as_ref()?.captures(content)?;
        let name = captures.get(1)?.as_str();
        let argument = captures.get(2).map_or("", |m| m.as_str());
        Some((name, argument))
    }

    /// Run the command `message.content` names, or the fallback.
    ///
    /// # Errors
    /// Returns whatever the command returns.
    pub async fn run(&self, message: &GroupMessage) -> Result<(), HandlerError> {
        let content = message.content.as_str();
        match self
            .parse(content)
            .and_then(|(name, argument)| Some((name, self.commands.get(name)?, argument)))
        {
            Some((name, command, argument)) => {
                tracing::debug!(command = name, "Matched command");
                command.run(message, argument).await
            }
            None => self.fallback.run(message, content).await,
        }
    }
}

/// Builder for [`CommandRouter`].
pub struct CommandRouterBuilder {
    commands: Vec<(String, Arc<dyn Command>)>,
    fallback: Arc<dyn Command>,
}

impl CommandRouterBuilder {
    /// Register a command under `name`.
    #[must_use]
    pub fn command(mut self, name: impl Into<String>, command: Arc<dyn Command>) -> Self {
        self.commands.push((name.into(), command));
        self
    }

    /// Build the router.
    ///
    /// # Errors
    /// Returns error if a name is empty or registered twice.
    pub fn build(self) -> Result<CommandRouter, CommandRouterError> {
        let mut commands = HashMap::with_capacity(self.commands.len());
        for (name, command) in self.commands {
            if name.is_empty() {
                return Err(CommandRouterError::EmptyName);
            }
            if commands.insert(name.clone(), command).is_some() {
                return Err(CommandRouterError::Duplicate(name));
            }
        }

        let pattern = if commands.is_empty() {
            None
        } else {
            // Longest first so a name never shadows a longer one sharing its prefix.
            let mut names: Vec<&str> = commands.keys().map(String::as_str).collect();
            names.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
            let alternation = names
                .iter()
                .map(|name| regex::escape(name))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&format!(r"(?s)^\s*/({alternation})\s*(.*)$"))?)
        };

        Ok(CommandRouter {
            commands,
            pattern,
            fallback: self.fallback,
        })
    }
}
