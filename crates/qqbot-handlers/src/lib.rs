//! Group message handling for the bot.
//!
//! Provides:
//! - `CommandRouter` - Explicit `name -> command` table with a fallback
//! - `GroupMessageHandler` - Handler for group @-messages
//! - Built-in commands and the generative chat fallback
//! - HTTP collaborators: reply API, Gemini, image download

pub mod builtin;
pub mod chat;
pub mod command;
pub mod fetch;
pub mod gemini;
pub mod message;
pub mod reply;

pub use command::{Command, CommandRouter, CommandRouterBuilder};
pub use fetch::HttpImageFetcher;
pub use gemini::{GeminiClient, GeminiConfig};
pub use message::{Attachment, GroupMessage, GroupMessageHandler, Services};
pub use reply::{OpenApiClient, send_reply};

#[cfg(test)]
mod testing;
