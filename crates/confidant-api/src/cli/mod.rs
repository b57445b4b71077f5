//! CLI command definitions for the `confidant` binary.
//!
//! Uses clap derive macros for argument parsing. Commands follow a
//! noun-verb pattern (e.g., `confidant memory list`, `confidant provider status`).

pub mod chat;
pub mod memory;
pub mod persona;
pub mod provider;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use memory::MemoryCommand;
use persona::PersonaCommand;
use provider::ProviderCommand;

/// A chat companion that remembers.
#[derive(Parser)]
#[command(name = "confidant", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write log events as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Data directory holding `confidant.toml` and the database.
    #[arg(long, global = true, env = "CONFIDANT_HOME", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive conversation.
    Chat {
        /// Conversation (channel) identifier; one session per conversation.
        #[arg(long, short = 'c', default_value = "cli")]
        conversation: String,

        /// Author identifier used for user-scoped memories.
        #[arg(long, short = 'u')]
        user: Option<String>,

        /// Server identifier used for server-scoped memories and persona.
        #[arg(long, short = 's')]
        server: Option<String>,
    },

    /// Inspect and manage long-term memories.
    #[command(alias = "mem")]
    Memory {
        #[command(subcommand)]
        action: MemoryCommand,
    },

    /// Show provider health and fallback order.
    Provider {
        #[command(subcommand)]
        action: ProviderCommand,
    },

    /// Manage per-server persona overrides.
    Persona {
        #[command(subcommand)]
        action: PersonaCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_chat_defaults() {
        let cli = Cli::try_parse_from(["confidant", "chat"]).unwrap();
        match cli.command {
            Commands::Chat {
                conversation,
                user,
                server,
            } => {
                assert_eq!(conversation, "cli");
                assert!(user.is_none());
                assert!(server.is_none());
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["confidant", "provider", "status", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_memory_forget_requires_user() {
        assert!(Cli::try_parse_from(["confidant", "memory", "forget"]).is_err());
        let cli =
            Cli::try_parse_from(["confidant", "memory", "forget", "--user", "42", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Memory {
                action: MemoryCommand::Forget { force: true, .. }
            }
        ));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
