//! Memory management CLI commands: list, forget, cleanup.
//!
//! Browsing a user's memories with their scores, wiping everything stored
//! about a user (with confirmation), and running the retention sweep on demand.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use confidant_types::memory::{MemoryMatch, MemoryScope};

use crate::state::AppState;

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// List memories about a user, most important first.
    #[command(alias = "ls")]
    List {
        /// Author identifier.
        #[arg(long, short = 'u')]
        user: String,

        /// Rank by similarity to this text instead of importance.
        #[arg(long, short = 'q')]
        query: Option<String>,

        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Delete every memory about a user, across all scopes.
    Forget {
        #[arg(long, short = 'u')]
        user: String,

        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },

    /// Delete old, unimportant memories.
    Cleanup {
        /// Only memories older than this many days (default from config).
        #[arg(long)]
        max_age_days: Option<u32>,

        /// Only memories with importance below this (default from config).
        #[arg(long)]
        below: Option<f32>,
    },
}

pub async fn handle_memory_command(cmd: MemoryCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        MemoryCommand::List { user, query, limit } => {
            list_memories(state, &user, query.as_deref(), limit, json).await
        }
        MemoryCommand::Forget { user, force } => forget_user(state, &user, force, json).await,
        MemoryCommand::Cleanup {
            max_age_days,
            below,
        } => cleanup(state, max_age_days, below, json).await,
    }
}

/// List memories for a user with scope, type, and importance.
///
/// # Examples
///
/// ```bash
/// confidant memory list --user 1234
/// confidant memory list --user 1234 --query "favourite food" --json
/// ```
async fn list_memories(
    state: &AppState,
    user: &str,
    query: Option<&str>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let memory = state.require_memory()?;
    let matches = memory.query_user(user, query, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!();
        println!(
            "  {} No memories for user '{}'.",
            style("i").blue().bold(),
            style(user).cyan(),
        );
        println!();
        return Ok(());
    }

    println!();
    println!("  Memories for user '{}'", style(user).cyan().bold());
    println!();
    println!("{}", memory_table(&matches, query.is_some()));
    println!();
    println!(
        "  {} memor{}",
        style(matches.len()).bold(),
        if matches.len() == 1 { "y" } else { "ies" }
    );
    println!();

    Ok(())
}

fn memory_table(matches: &[MemoryMatch], show_similarity: bool) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![
        Cell::new("Memory").fg(Color::White),
        Cell::new("Scope").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Importance").fg(Color::White),
        Cell::new("Date").fg(Color::White),
    ];
    if show_similarity {
        header.push(Cell::new("Similarity").fg(Color::White));
    }
    table.set_header(header);

    for m in matches {
        let record = &m.record;
        let scope_cell = match record.scope {
            MemoryScope::Session => Cell::new("session").fg(Color::Blue),
            MemoryScope::User => Cell::new("user").fg(Color::Magenta),
            MemoryScope::Server => Cell::new("server").fg(Color::Yellow),
        };

        let mut row = vec![
            Cell::new(truncate(&record.content, 60)).fg(Color::White),
            scope_cell,
            Cell::new(record.memory_type.to_string()).fg(Color::Cyan),
            Cell::new(format!("{:.2}", record.importance)).fg(Color::Yellow),
            Cell::new(record.created_at.format("%Y-%m-%d").to_string()).fg(Color::DarkGrey),
        ];
        if show_similarity {
            row.push(Cell::new(format!("{:.2}", m.similarity)).fg(Color::Green));
        }
        table.add_row(row);
    }

    table
}

/// Wipe every memory about a user.
///
/// # Examples
///
/// ```bash
/// confidant memory forget --user 1234
/// confidant memory forget --user 1234 --force
/// ```
async fn forget_user(state: &AppState, user: &str, force: bool, json: bool) -> Result<()> {
    let memory = state.require_memory()?;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete ALL memories about user '{user}'? This cannot be undone"
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let deleted = memory.forget_user(user).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "user": user, "deleted": deleted })
        );
    } else {
        println!(
            "  {} Forgot {} memor{} about '{}'.",
            style("x").red().bold(),
            deleted,
            if deleted == 1 { "y" } else { "ies" },
            style(user).cyan()
        );
    }

    Ok(())
}

/// Run the retention sweep now instead of waiting for the scheduler.
async fn cleanup(
    state: &AppState,
    max_age_days: Option<u32>,
    below: Option<f32>,
    json: bool,
) -> Result<()> {
    let memory = state.require_memory()?;
    let config = memory.config();
    let max_age_days = max_age_days.unwrap_or(config.cleanup_max_age_days);
    let below = below.unwrap_or(config.cleanup_importance_below).clamp(0.0, 1.0);

    let deleted = memory
        .cleanup(chrono::Duration::days(i64::from(max_age_days)), below)
        .await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "deleted": deleted,
                "max_age_days": max_age_days,
                "importance_below": below,
            })
        );
    } else {
        println!(
            "  {} Removed {} memor{} older than {} days with importance below {:.2}.",
            style("*").cyan().bold(),
            deleted,
            if deleted == 1 { "y" } else { "ies" },
            max_age_days,
            below
        );
    }

    Ok(())
}

/// Shorten `text` to at most `max` characters, marking the cut.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
