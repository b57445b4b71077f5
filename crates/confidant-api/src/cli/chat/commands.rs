//! Slash command parsing for the chat loop.
//!
//! Commands start with `/` and are handled locally; they never reach the
//! conversation pipeline.

use console::style;

/// Available slash commands in the chat loop.
#[derive(Debug, PartialEq)]
pub enum ChatCommand {
    /// Show available commands.
    Help,
    /// Clear the terminal screen.
    Clear,
    /// Exit the chat session.
    Exit,
    /// Save a fact about the current user.
    Remember(String),
    /// List what is remembered about the current user.
    Memories,
    /// Show (`None`) or set the session's preferred `provider[:model]`.
    Model(Option<String>),
    /// Drop the session's provider preference.
    ResetModel,
    /// Show provider health.
    Providers,
    /// Unknown command or missing argument.
    Unknown(String),
}

/// Parse user input as a slash command.
///
/// Returns `None` if the input doesn't start with `/`.
pub fn parse(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (cmd, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd.to_lowercase(), Some(arg.trim()).filter(|a| !a.is_empty())),
        None => (trimmed.to_lowercase(), None),
    };

    let command = match cmd.as_str() {
        "/help" | "/h" | "/?" => ChatCommand::Help,
        "/clear" | "/cls" => ChatCommand::Clear,
        "/exit" | "/quit" | "/q" => ChatCommand::Exit,
        "/remember" | "/rem" => match arg {
            Some(fact) => ChatCommand::Remember(fact.to_string()),
            None => ChatCommand::Unknown("/remember requires a fact".to_string()),
        },
        "/memories" | "/mem" => ChatCommand::Memories,
        "/model" => match arg {
            Some("reset") | Some("default") => ChatCommand::ResetModel,
            other => ChatCommand::Model(other.map(str::to_string)),
        },
        "/providers" | "/status" => ChatCommand::Providers,
        other => ChatCommand::Unknown(other.to_string()),
    };
    Some(command)
}

/// Print the help text listing all available commands.
pub fn print_help() {
    let rows = [
        ("/help", "Show this help message"),
        ("/clear", "Clear the screen"),
        ("/exit", "End the chat session"),
        ("/remember <fact>", "Save a fact about you"),
        ("/memories", "Show what is remembered about you"),
        ("/model [provider[:model]]", "Show or set the preferred backend"),
        ("/model reset", "Go back to the default provider order"),
        ("/providers", "Show provider health"),
    ];

    println!();
    println!("  {}", style("Available commands:").bold());
    println!();
    for (command, description) in rows {
        println!("  {:<28}{}", style(command).cyan(), description);
    }
    println!();
    println!(
        "  {}",
        style("Ctrl+D to exit, Ctrl+C safe (no message loss)").dim()
    );
    println!();
}
