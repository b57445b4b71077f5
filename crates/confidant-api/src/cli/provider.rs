//! Provider CLI commands: status and fallback order.
//!
//! Providers are declared in `confidant.toml`; these commands only report.
//! Circuit state lives in memory, so `status` shows the state of this
//! process, which is freshly closed unless a probe has failed.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use confidant_types::llm::ProviderStatusInfo;

use crate::state::AppState;

#[derive(Subcommand)]
pub enum ProviderCommand {
    /// Show health of all configured providers.
    Status,

    /// Show the order providers are tried in.
    Order {
        /// Put this provider first, as a session preference would.
        #[arg(long, short = 'p')]
        preferred: Option<String>,
    },
}

pub async fn handle_provider_command(
    cmd: ProviderCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        ProviderCommand::Status => provider_status(state, json),
        ProviderCommand::Order { preferred } => provider_order(state, preferred.as_deref(), json),
    }
}

fn provider_status(state: &AppState, json: bool) -> Result<()> {
    let statuses = state.executor.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        println!();
        println!(
            "  {} No providers configured. Add a {} entry to {}.",
            style("i").blue().bold(),
            style("[[providers]]").cyan(),
            style(state.data_dir.join("confidant.toml").display()).cyan()
        );
        println!();
        return Ok(());
    }

    println!();
    println!("  {}", style("Provider Health Status").bold());
    println!();
    println!("{}", status_table(&statuses));
    println!();
    println!(
        "  {} provider{}",
        style(statuses.len()).bold(),
        if statuses.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

fn status_table(statuses: &[ProviderStatusInfo]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Provider").fg(Color::White),
        Cell::new("Model").fg(Color::White),
        Cell::new("Enabled").fg(Color::White),
        Cell::new("Circuit").fg(Color::White),
        Cell::new("Last Error").fg(Color::White),
        Cell::new("Calls").fg(Color::White),
        Cell::new("Failures").fg(Color::White),
    ]);

    for status in statuses {
        let circuit_cell = match status.circuit_state.as_str() {
            "closed" => Cell::new("closed").fg(Color::Green),
            "open" => Cell::new("OPEN").fg(Color::Red),
            "half_open" => Cell::new("half_open").fg(Color::Yellow),
            other => Cell::new(other).fg(Color::White),
        };
        let enabled_cell = if status.enabled {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::Red)
        };

        let last_error = status.last_error.as_deref().unwrap_or("-");
        let last_error_display = if last_error.chars().count() > 40 {
            let kept: String = last_error.chars().take(37).collect();
            format!("{kept}...")
        } else {
            last_error.to_string()
        };

        table.add_row(vec![
            Cell::new(&status.name).fg(Color::Cyan),
            Cell::new(&status.model).fg(Color::DarkGrey),
            enabled_cell,
            circuit_cell,
            Cell::new(last_error_display).fg(Color::DarkGrey),
            Cell::new(status.total_calls).fg(Color::White),
            Cell::new(status.total_failures).fg(Color::White),
        ]);
    }

    table
}

fn provider_order(state: &AppState, preferred: Option<&str>, json: bool) -> Result<()> {
    let order = state.executor.provider_order(preferred);

    if json {
        println!("{}", serde_json::to_string_pretty(&order)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("Fallback Chain Order").bold());
    println!();
    if order.is_empty() {
        println!("  {}", style("(no usable providers)").dim());
    }
    for (position, name) in order.iter().enumerate() {
        println!("  {}. {}", style(position + 1).cyan(), name);
    }
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table_has_row_per_provider() {
        let statuses = vec![
            ProviderStatusInfo {
                name: "grok".to_string(),
                model: "grok-3-mini".to_string(),
                enabled: true,
                circuit_state: "open".to_string(),
                last_error: Some("rate limited (retry after Some(1000)ms)".to_string()),
                total_calls: 4,
                total_failures: 3,
            },
            ProviderStatusInfo {
                name: "openai".to_string(),
                model: "gpt-4o-mini".to_string(),
                enabled: true,
                circuit_state: "closed".to_string(),
                last_error: None,
                total_calls: 1,
                total_failures: 0,
            },
        ];

        let rendered = status_table(&statuses).to_string();
        assert!(rendered.contains("grok-3-mini"));
        assert!(rendered.contains("OPEN"));
        assert!(rendered.contains("gpt-4o-mini"));
    }
}
