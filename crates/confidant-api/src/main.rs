//! Confidant CLI entry point.
//!
//! Binary name: `confidant`
//!
//! Parses CLI arguments, sets up tracing, initializes the database and
//! services, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use confidant_observe::{TracingConfig, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&TracingConfig {
        default_directive: TracingConfig::directive_for(cli.verbose, cli.quiet).to_string(),
        json: cli.log_json,
        enable_otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "confidant", &mut std::io::stdout());
        return Ok(());
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init(cli.data_dir.as_deref()).await?;

    match cli.command {
        Commands::Chat {
            conversation,
            user,
            server,
        } => {
            cli::chat::loop_runner::run_chat_loop(&state, conversation, user, server).await?;
        }
        Commands::Memory { action } => {
            cli::memory::handle_memory_command(action, &state, cli.json).await?;
        }
        Commands::Provider { action } => {
            cli::provider::handle_provider_command(action, &state, cli.json).await?;
        }
        Commands::Persona { action } => {
            cli::persona::handle_persona_command(action, &state, cli.json).await?;
        }
        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}
