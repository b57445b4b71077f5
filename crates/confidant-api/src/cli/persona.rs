//! Per-server persona overrides.
//!
//! An override replaces the configured persona prompt for every
//! conversation on that server. It sits at the head of the prompt, so
//! changing it invalidates the provider's prefix cache for that server.

use anyhow::Result;
use clap::Subcommand;
use console::style;

use confidant_core::chat::repository::SessionRepository;

use crate::state::AppState;

#[derive(Subcommand)]
pub enum PersonaCommand {
    /// Show the persona used on a server.
    Show {
        #[arg(long, short = 's')]
        server: String,
    },

    /// Replace the persona for a server.
    Set {
        #[arg(long, short = 's')]
        server: String,

        /// Persona text (system prompt).
        text: String,
    },

    /// Remove a server's override and fall back to the configured persona.
    Clear {
        #[arg(long, short = 's')]
        server: String,
    },
}

pub async fn handle_persona_command(
    cmd: PersonaCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        PersonaCommand::Show { server } => {
            let custom = state.sessions.get_server_persona(&server).await?;
            let persona = custom
                .as_deref()
                .unwrap_or(&state.config.persona.system_prompt);
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "server": server,
                        "custom": custom.is_some(),
                        "persona": persona,
                    })
                );
            } else {
                println!();
                println!(
                    "  {} {}",
                    style(format!("Persona for '{server}'")).bold(),
                    if custom.is_some() {
                        style("(custom)").yellow()
                    } else {
                        style("(default)").dim()
                    }
                );
                println!();
                println!("  {persona}");
                println!();
            }
        }
        PersonaCommand::Set { server, text } => {
            let text = text.trim();
            if text.is_empty() {
                anyhow::bail!("Persona text must not be empty");
            }
            state.sessions.set_server_persona(&server, text).await?;
            if json {
                println!("{}", serde_json::json!({ "server": server, "set": true }));
            } else {
                println!(
                    "  {} Persona for '{}' updated.",
                    style("+").green().bold(),
                    style(&server).cyan()
                );
            }
        }
        PersonaCommand::Clear { server } => {
            let removed = state.sessions.clear_server_persona(&server).await?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "server": server, "cleared": removed })
                );
            } else if removed {
                println!(
                    "  {} Persona override for '{}' removed.",
                    style("x").red().bold(),
                    style(&server).cyan()
                );
            } else {
                println!(
                    "  {} '{}' has no persona override.",
                    style("?").yellow().bold(),
                    style(&server).cyan()
                );
            }
        }
    }

    Ok(())
}
