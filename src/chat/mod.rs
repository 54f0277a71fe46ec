//! Terminal front end for the chat session controller.
//!
//! This module provides the pieces the `palaver-chat` REPL is built from:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: Slash command parsing
//! - [`render`]: Transcript and status output
//!
//! The session logic itself lives in [`crate::session`].

mod commands;
mod config;
mod render;

pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use render::{PlainTextRenderer, Renderer};
