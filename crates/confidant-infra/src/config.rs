//! Configuration loader for Confidant.
//!
//! Reads `confidant.toml` from the data directory (`~/.confidant/` by default)
//! and deserializes it into [`CompanionConfig`]. Falls back to defaults when
//! the file is missing or malformed.

use std::path::{Path, PathBuf};

use confidant_types::config::CompanionConfig;

/// File name of the configuration inside the data directory.
pub const CONFIG_FILE: &str = "confidant.toml";

/// Environment variable overriding the data directory.
pub const HOME_ENV: &str = "CONFIDANT_HOME";

/// Resolve the data directory.
///
/// Priority: explicit override (`--data-dir`), then `CONFIDANT_HOME`, then
/// `~/.confidant`, then `./.confidant` when no home directory is known.
pub fn resolve_data_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }

    if let Ok(dir) = std::env::var(HOME_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".confidant");
    }

    PathBuf::from(".confidant")
}

/// Load configuration from `{data_dir}/confidant.toml`.
///
/// - A missing file yields [`CompanionConfig::default()`].
/// - An unreadable or unparsable file logs a warning and yields the default.
/// - Out-of-range values are pulled back into range by [`normalize`].
pub async fn load_config(data_dir: &Path) -> CompanionConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", config_path.display());
            return CompanionConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return CompanionConfig::default();
        }
    };

    match toml::from_str::<CompanionConfig>(&content) {
        Ok(mut config) => {
            normalize(&mut config);
            config
        }
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            CompanionConfig::default()
        }
    }
}

/// Clamp values that would make a component misbehave.
pub fn normalize(config: &mut CompanionConfig) {
    let defaults = CompanionConfig::default();

    let reasoning = &mut config.reasoning;
    clamp_unit(
        "reasoning.confidence_threshold",
        &mut reasoning.confidence_threshold,
        defaults.reasoning.confidence_threshold,
    );
    if reasoning.max_iterations == 0 {
        tracing::warn!("reasoning.max_iterations is 0, using 1");
        reasoning.max_iterations = 1;
    }

    let memory = &mut config.memory;
    for (name, value, default) in [
        (
            "memory.min_importance",
            &mut memory.min_importance,
            defaults.memory.min_importance,
        ),
        (
            "memory.similarity_threshold",
            &mut memory.similarity_threshold,
            defaults.memory.similarity_threshold,
        ),
        (
            "memory.cleanup_importance_below",
            &mut memory.cleanup_importance_below,
            defaults.memory.cleanup_importance_below,
        ),
    ] {
        clamp_unit(name, value, default);
    }

    if config.compaction.max_context_tokens == 0 {
        tracing::warn!("compaction.max_context_tokens is 0, using the default");
        config.compaction.max_context_tokens = CompanionConfig::default().compaction.max_context_tokens;
    }

    for interval in [
        &mut config.gate.sweep_interval_secs,
        &mut config.scheduler.interval_secs,
    ] {
        if *interval == 0 {
            *interval = 1;
        }
    }
}

/// Keep `value` within [0, 1]. NaN has no nearest bound, so it takes `default`.
fn clamp_unit(name: &str, value: &mut f32, default: f32) {
    if value.is_nan() {
        tracing::warn!(setting = name, default, "Value is NaN, using the default");
        *value = default;
    } else if !(0.0..=1.0).contains(value) {
        tracing::warn!(setting = name, value = *value, "Value outside [0, 1], clamping");
        *value = value.clamp(0.0, 1.0);
    }
}
