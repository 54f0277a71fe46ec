//! Output rendering for the chat application.
//!
//! This module provides a trait-based rendering abstraction so the REPL can be
//! driven against stdout or a buffer.  The default implementation uses ANSI
//! escape codes to set unconfirmed messages and errors apart from the
//! transcript.

use std::io::{self, Write};

use time::macros::format_description;

use crate::session::Transcript;
use crate::types::ChatTurn;

/// ANSI escape code for dim text (used for unconfirmed messages and timestamps).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for speaker labels).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the assistant label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI sequence that clears the screen and homes the cursor.
const ANSI_CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Trait for rendering chat output.
pub trait Renderer: Send {
    /// Print one confirmed exchange: the user's message, then the reply.
    fn print_turn(&mut self, turn: &ChatTurn);

    /// Show a message that has been submitted but not confirmed.
    fn print_pending(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Clear the screen.
    fn clear_screen(&mut self);

    /// Called when the user interrupts a request.
    fn print_interrupted(&mut self);

    /// Print every turn, oldest first.
    fn print_transcript(&mut self, transcript: &Transcript) {
        if transcript.is_empty() {
            self.print_info("No messages yet. Say hello!");
            return;
        }
        for turn in transcript {
            self.print_turn(turn);
        }
    }
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    out: Box<dyn Write + Send>,
    /// Errors go here; `None` sends them to `out`.
    err: Option<Box<dyn Write + Send>>,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            out: Box::new(io::stdout()),
            err: Some(Box::new(io::stderr())),
            use_color,
        }
    }

    /// Renders everything, errors included, to `out`.
    pub fn with_writer(out: impl Write + Send + 'static, use_color: bool) -> Self {
        Self {
            out: Box::new(out),
            err: None,
            use_color,
        }
    }

    fn style(&self, code: &'static str) -> &'static str {
        if self.use_color { code } else { "" }
    }

    fn write_out(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    fn write_err(&mut self, text: &str) {
        let writer = match self.err.as_mut() {
            Some(err) => err,
            None => &mut self.out,
        };
        let _ = writer.write_all(text.as_bytes());
        let _ = writer.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn format_timestamp(turn: &ChatTurn) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
    turn.created_at
        .format(format)
        .unwrap_or_else(|_| turn.created_at.to_string())
}

impl Renderer for PlainTextRenderer {
    fn print_turn(&mut self, turn: &ChatTurn) {
        let (bold, cyan, dim, reset) = (
            self.style(ANSI_BOLD),
            self.style(ANSI_CYAN),
            self.style(ANSI_DIM),
            self.style(ANSI_RESET),
        );
        let when = format_timestamp(turn);
        let text = format!(
            "{bold}you{reset} {dim}{when}{reset}\n{}\n{bold}{cyan}assistant{reset}\n{}\n\n",
            turn.message, turn.response
        );
        self.write_out(&text);
    }

    fn print_pending(&mut self, text: &str) {
        let (dim, reset) = (self.style(ANSI_DIM), self.style(ANSI_RESET));
        self.write_out(&format!("{dim}you (sending…)\n{text}{reset}\n"));
    }

    fn print_error(&mut self, error: &str) {
        let (red, reset) = (self.style(ANSI_RED), self.style(ANSI_RESET));
        self.write_err(&format!("{red}Error: {error}{reset}\n"));
    }

    fn print_info(&mut self, info: &str) {
        self.write_out(&format!("{info}\n"));
    }

    fn clear_screen(&mut self) {
        if self.use_color {
            self.write_out(ANSI_CLEAR_SCREEN);
        } else {
            self.write_out("\n");
        }
    }

    fn print_interrupted(&mut self) {
        self.write_out("[interrupted]\n");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use time::macros::datetime;

    use super::*;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Buffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn turn() -> ChatTurn {
        ChatTurn::new(7, "hi", "hello!", datetime!(2024-05-01 10:30:00 UTC))
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
    }

    #[test]
    fn plain_turn() {
        let buffer = Buffer::default();
        let mut renderer = PlainTextRenderer::with_writer(buffer.clone(), false);
        renderer.print_turn(&turn());
        assert_eq!(
            buffer.contents(),
            "you 2024-05-01 10:30\nhi\nassistant\nhello!\n\n"
        );
    }

    #[test]
    fn pending_is_dimmed() {
        let buffer = Buffer::default();
        let mut renderer = PlainTextRenderer::with_writer(buffer.clone(), true);
        renderer.print_pending("hi");
        let out = buffer.contents();
        assert!(out.starts_with(ANSI_DIM));
        assert!(out.contains("sending…"));
        assert!(out.contains("hi"));
    }

    #[test]
    fn empty_transcript_prompts() {
        let buffer = Buffer::default();
        let mut renderer = PlainTextRenderer::with_writer(buffer.clone(), false);
        renderer.print_transcript(&Transcript::new());
        assert_eq!(buffer.contents(), "No messages yet. Say hello!\n");
    }

    #[test]
    fn errors_share_the_writer() {
        let buffer = Buffer::default();
        let mut renderer = PlainTextRenderer::with_writer(buffer.clone(), false);
        renderer.print_error("Session expired: Could not validate credentials");
        assert_eq!(
            buffer.contents(),
            "Error: Session expired: Could not validate credentials\n"
        );
    }
}
