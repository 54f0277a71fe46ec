//! Interactive chat client.
//!
//! Logs in against a palaver chat server, shows the conversation so far and
//! sends each line typed as a new message.
//!
//! # Usage
//!
//! ```bash
//! # Talk to a server on localhost:8000
//! palaver-chat
//!
//! # Somewhere else, keeping the token in memory only
//! palaver-chat --base-url https://chat.example.com --ephemeral
//!
//! # Settings from a file, colors off
//! palaver-chat --config palaver.yaml --no-color
//! ```
//!
//! # Commands
//!
//! - `/login <user>` - Log in; the password is prompted for
//! - `/register <user> <email>` - Create an account
//! - `/logout` - Forget the session
//! - `/retry` - Retry loading history
//! - `/status` - Show session status
//! - `/quit` - Exit the application

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::time::Instant;

use palaver::chat::{
    ChatArgs, ChatCommand, ChatConfig, PlainTextRenderer, Renderer, help_text, parse_command,
};
use palaver::{ChatSession, ClientConfig, Error, HistoryState, Palaver};

const LOGIN_HINT: &str = "Please log in with /login <user> (or /register <user> <email>).";

/// Main entry point for the palaver-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("palaver-chat [OPTIONS]");
    let config = ChatConfig::from(args);
    let client_config = config.client_config()?;
    let store = config.token_store(&client_config)?;
    let client = Arc::new(Palaver::from_config(&client_config, store)?);

    let mut session = new_session(&client, &client_config);
    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    let mut rl = DefaultEditor::new()?;

    // Flag for interrupt handling while a request is outstanding
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    println!("palaver chat ({})", client.base_url());
    println!("Type /help for commands, /quit to exit\n");

    if client.is_authenticated()? {
        let outcome = load_history(&mut session, &mut renderer, &interrupted, false).await;
        after_failure(outcome, &mut session, &client, &client_config, &mut renderer);
    } else {
        renderer.print_info(LOGIN_HINT);
    }

    loop {
        interrupted.store(false, Ordering::Relaxed);

        match rl.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                let Some(cmd) = parse_command(line) else {
                    let outcome = send_line(&mut session, line, &mut renderer, &interrupted).await;
                    after_failure(outcome, &mut session, &client, &client_config, &mut renderer);
                    continue;
                };

                match cmd {
                    ChatCommand::Quit => {
                        println!("Goodbye!");
                        break;
                    }
                    ChatCommand::Login(username) => {
                        let Some(password) = read_password(&mut rl, &mut renderer) else {
                            continue;
                        };
                        match client.login(&username, &password).await {
                            Ok(_) => {
                                renderer.print_info(&format!("Logged in as {username}."));
                                session.teardown();
                                session = new_session(&client, &client_config);
                                let outcome =
                                    load_history(&mut session, &mut renderer, &interrupted, false)
                                        .await;
                                after_failure(
                                    outcome,
                                    &mut session,
                                    &client,
                                    &client_config,
                                    &mut renderer,
                                );
                            }
                            Err(err) => renderer.print_error(&err.to_string()),
                        }
                    }
                    ChatCommand::Register { username, email } => {
                        let Some(password) = read_password(&mut rl, &mut renderer) else {
                            continue;
                        };
                        match client.register(&username, &email, &password).await {
                            Ok(response) => {
                                let message = response
                                    .message
                                    .unwrap_or_else(|| "Registration complete".to_string());
                                renderer.print_info(&format!(
                                    "{message}. Log in with /login {username}."
                                ));
                            }
                            Err(err) => renderer.print_error(&err.to_string()),
                        }
                    }
                    ChatCommand::Logout => {
                        session.teardown();
                        session = new_session(&client, &client_config);
                        match client.logout() {
                            Ok(()) => renderer.print_info("Logged out."),
                            Err(err) => renderer.print_error(&err.to_string()),
                        }
                    }
                    ChatCommand::Retry => {
                        let outcome =
                            load_history(&mut session, &mut renderer, &interrupted, true).await;
                        after_failure(
                            outcome,
                            &mut session,
                            &client,
                            &client_config,
                            &mut renderer,
                        );
                    }
                    ChatCommand::History => {
                        renderer.print_transcript(session.transcript());
                    }
                    ChatCommand::Clear => {
                        renderer.clear_screen();
                    }
                    ChatCommand::Status => {
                        print_status(&session, &client);
                    }
                    ChatCommand::Help => {
                        for line in help_text().lines() {
                            println!("    {}", line);
                        }
                    }
                    ChatCommand::Invalid(message) => {
                        renderer.print_error(&message);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    session.teardown();
    Ok(())
}

fn new_session(client: &Arc<Palaver>, config: &ClientConfig) -> ChatSession<Palaver> {
    ChatSession::new(Arc::clone(client))
        .with_retry_policy(config.retry_policy())
        .with_debounce(config.debounce())
}

/// Prompt for a password on its own line.  The entry never reaches line history.
fn read_password(rl: &mut DefaultEditor, renderer: &mut PlainTextRenderer) -> Option<String> {
    match rl.readline("Password: ") {
        Ok(password) if !password.is_empty() => Some(password),
        Ok(_) => {
            renderer.print_error("Password must not be empty");
            None
        }
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
            renderer.print_interrupted();
            None
        }
        Err(err) => {
            renderer.print_error(&format!("Input error: {}", err));
            None
        }
    }
}

/// Resolves once the Ctrl+C handler has fired.
async fn wait_for_interrupt(flag: &AtomicBool) {
    while !flag.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn load_history(
    session: &mut ChatSession<Palaver>,
    renderer: &mut PlainTextRenderer,
    interrupted: &AtomicBool,
    manual_retry: bool,
) -> Result<(), Error> {
    renderer.print_info("Loading conversation…");
    let loaded = tokio::select! {
        loaded = async {
            if manual_retry {
                session.retry_history().await
            } else {
                session.load_history().await
            }
        } => Some(loaded),
        _ = wait_for_interrupt(interrupted) => None,
    };
    let Some(loaded) = loaded else {
        session.interrupt_history();
        renderer.print_interrupted();
        renderer.print_info("Use /retry to load the conversation.");
        return Ok(());
    };
    match loaded {
        Ok(()) => {
            renderer.print_transcript(session.transcript());
            Ok(())
        }
        Err(err) => {
            renderer.print_error(&err.to_string());
            if matches!(session.history_state(), HistoryState::Failed { .. }) {
                renderer.print_info("Use /retry to try again.");
            }
            Err(err)
        }
    }
}

async fn send_line(
    session: &mut ChatSession<Palaver>,
    line: &str,
    renderer: &mut PlainTextRenderer,
    interrupted: &AtomicBool,
) -> Result<(), Error> {
    if let Err(err) = session.submit(line) {
        renderer.print_error(&err.to_string());
        return Err(err);
    }
    renderer.print_pending(line);

    let Some(deadline) = session.send_deadline() else {
        return Ok(());
    };
    tokio::select! {
        _ = tokio::time::sleep_until(deadline) => {}
        _ = wait_for_interrupt(interrupted) => {
            session.discard_pending();
            renderer.print_interrupted();
            return Ok(());
        }
    }

    let Some(outgoing) = session.take_ready_send(Instant::now()) else {
        return Ok(());
    };
    let request = session.dispatch(&outgoing);
    let result = tokio::select! {
        result = request => result,
        _ = wait_for_interrupt(interrupted) => Err(Error::abort("interrupted by user")),
    };
    match session.complete_send(outgoing, result) {
        Ok(turn) => {
            renderer.print_turn(&turn);
            Ok(())
        }
        Err(err) if err.is_abort() => {
            renderer.print_interrupted();
            Ok(())
        }
        Err(err) => {
            renderer.print_error(&err.to_string());
            Err(err)
        }
    }
}

/// After a failed request: if the server wants a new login, drop the transcript and say so.
fn after_failure(
    outcome: Result<(), Error>,
    session: &mut ChatSession<Palaver>,
    client: &Arc<Palaver>,
    config: &ClientConfig,
    renderer: &mut PlainTextRenderer,
) {
    let Err(err) = outcome else {
        return;
    };
    if err.requires_reauth() {
        session.teardown();
        *session = new_session(client, config);
        renderer.print_info(LOGIN_HINT);
    }
}

fn print_status(session: &ChatSession<Palaver>, client: &Palaver) {
    let stats = session.stats();
    let logged_in = client.is_authenticated().unwrap_or(false);
    println!("    Session Status:");
    println!("      Server: {}", client.base_url());
    println!("      Logged in: {}", if logged_in { "yes" } else { "no" });
    println!("      History: {}", stats.history);
    println!("      Messages: {}", stats.turn_count);
    println!(
        "      Sent: {} ({} failed)",
        stats.sent, stats.failed_sends
    );
    if let Some(text) = stats.in_flight.as_deref() {
        println!("      Sending: {}", text);
    }
    println!("      Debounce: {} ms", stats.debounce.as_millis());
    println!(
        "      History retries: {} (base delay {} ms)",
        stats.retry_policy.max_retries(),
        stats.retry_policy.base_delay().as_millis()
    );
    match stats.last_error.as_deref() {
        Some(err) => println!("      Last error: {}", err),
        None => println!("      Last error: (none)"),
    }
}
