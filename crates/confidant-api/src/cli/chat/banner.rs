//! Welcome banner display for chat sessions.

use console::style;

/// Print the welcome banner at the start of a chat session.
///
/// Shows the persona name, the provider order replies will be tried in,
/// and which conversation, user, and server the session is bound to.
pub fn print_welcome_banner(
    name: &str,
    providers: &[String],
    conversation_id: &str,
    user_id: Option<&str>,
    server_id: Option<&str>,
) {
    println!();
    println!("  * {}", style(name).cyan().bold());
    println!();
    let providers = if providers.is_empty() {
        "none configured".to_string()
    } else {
        providers.join(" -> ")
    };
    println!("  {}    {}", style("Providers:").bold(), style(providers).dim());
    println!(
        "  {} {}",
        style("Conversation:").bold(),
        style(conversation_id).dim()
    );
    if let Some(user) = user_id {
        println!("  {}         {}", style("User:").bold(), style(user).dim());
    }
    if let Some(server) = server_id {
        println!("  {}       {}", style("Server:").bold(), style(server).dim());
    }
    println!();
    println!(
        "  {}",
        style("Type /help for commands, Ctrl+D to exit").dim()
    );
    println!("  {}", style("---").dim());
    println!();
}
