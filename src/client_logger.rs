//! Logging trait for chat API operations.
//!
//! This module provides the [`ClientLogger`] trait that allows users to capture
//! and log every interaction passing through the [`Palaver`](crate::Palaver) client.

use crate::ChatTurn;
use crate::error::Error;

/// A trait for logging chat API operations.
///
/// Implement this trait to capture every history listing, every newly created turn, and
/// every failed request.  Tokens and passwords are never handed to the logger.
///
/// # Example
///
/// ```rust,ignore
/// use palaver::{ChatTurn, ClientLogger, Error};
/// use std::io::Write;
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ClientLogger for FileLogger {
///     fn log_history(&self, turns: &[ChatTurn]) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "history: {} turns", turns.len()).unwrap();
///     }
///
///     fn log_turn(&self, turn: &ChatTurn) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "turn: {}", serde_json::to_string(turn).unwrap()).unwrap();
///     }
///
///     fn log_error(&self, operation: &str, error: &Error) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "{operation} failed: {error}").unwrap();
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log the full history returned by a successful fetch.
    fn log_history(&self, turns: &[ChatTurn]);

    /// Log the turn returned by a successful send.
    fn log_turn(&self, turn: &ChatTurn);

    /// Log a failed request.  `operation` names the endpoint, e.g. `"login"`.
    fn log_error(&self, operation: &str, error: &Error);
}
