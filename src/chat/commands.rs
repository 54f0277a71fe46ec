//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to manage their account and the chat session without
//! sending a message.

/// A parsed chat command.
///
/// These commands control the session and are never sent as chat messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Log in as the given user.  The password is prompted for separately.
    Login(String),

    /// Create an account.  The password is prompted for separately.
    Register {
        /// Desired username.
        username: String,
        /// Contact email.
        email: String,
    },

    /// Forget the session token and drop the transcript.
    Logout,

    /// Retry loading history after it failed.
    Retry,

    /// Print the transcript again.
    History,

    /// Clear the screen.
    Clear,

    /// Display session status.
    Status,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it should be sent as a
/// message.
///
/// # Examples
///
/// ```
/// # use palaver::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/login alice").is_some());
/// assert!(parse_command("Hello there!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "login" => match argument {
            Some(user) if !user.contains(char::is_whitespace) => {
                ChatCommand::Login(user.to_string())
            }
            Some(_) => ChatCommand::Invalid("/login takes a single username".to_string()),
            None => ChatCommand::Invalid("/login requires a username".to_string()),
        },
        "register" => parse_register(argument),
        "logout" => ChatCommand::Logout,
        "retry" => ChatCommand::Retry,
        "history" => ChatCommand::History,
        "clear" => ChatCommand::Clear,
        "status" | "stats" => ChatCommand::Status,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn parse_register(argument: Option<&str>) -> ChatCommand {
    const USAGE: &str = "/register requires a username and an email";
    let Some(arg) = argument else {
        return ChatCommand::Invalid(USAGE.to_string());
    };
    let fields: Vec<&str> = arg.split_whitespace().collect();
    match fields.as_slice() {
        [username, email] if email.contains('@') => ChatCommand::Register {
            username: username.to_string(),
            email: email.to_string(),
        },
        [_, _] => ChatCommand::Invalid("/register expects a valid email address".to_string()),
        _ => ChatCommand::Invalid(USAGE.to_string()),
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /login <user>              Log in (you will be asked for the password)
  /register <user> <email>   Create an account
  /logout                    Log out and forget the session
  /retry                     Retry loading chat history
  /history                   Show the conversation again
  /clear                     Clear the screen
  /status                    Show session status
  /help                      Show this help message
  /quit                      Exit the chat

Anything else is sent as a message."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
    }

    #[test]
    fn parse_login() {
        assert_eq!(
            parse_command("/login alice"),
            Some(ChatCommand::Login("alice".to_string()))
        );
        assert_eq!(
            parse_command("/LOGIN   bob  "),
            Some(ChatCommand::Login("bob".to_string()))
        );
        assert!(matches!(
            parse_command("/login"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("requires")
        ));
        assert!(matches!(
            parse_command("/login alice secret"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("single")
        ));
    }

    #[test]
    fn parse_register_command() {
        assert_eq!(
            parse_command("/register alice alice@example.com"),
            Some(ChatCommand::Register {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
            })
        );
        assert!(matches!(
            parse_command("/register alice"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("requires")
        ));
        assert!(matches!(
            parse_command("/register alice not-an-email"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("email")
        ));
    }

    #[test]
    fn parse_session_commands() {
        assert_eq!(parse_command("/logout"), Some(ChatCommand::Logout));
        assert_eq!(parse_command("/retry"), Some(ChatCommand::Retry));
        assert_eq!(parse_command("/history"), Some(ChatCommand::History));
        assert_eq!(parse_command("/clear"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/status"), Some(ChatCommand::Status));
        assert_eq!(parse_command("/stats"), Some(ChatCommand::Status));
        assert_eq!(parse_command("/help"), Some(ChatCommand::Help));
        assert_eq!(parse_command("/?"), Some(ChatCommand::Help));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            parse_command("/model gpt"),
            Some(ChatCommand::Invalid("Unknown command: /model".to_string()))
        );
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("Hello there!"), None);
        assert_eq!(parse_command("what does a/b mean?"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn help_text_lists_commands() {
        let help = help_text();
        for command in ["/login", "/register", "/logout", "/retry", "/quit"] {
            assert!(help.contains(command), "missing {command}");
        }
    }
}
