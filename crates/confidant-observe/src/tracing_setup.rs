//! Tracing subscriber initialization with structured logging and optional
//! OpenTelemetry trace export.
//!
//! # Usage
//!
//! ```no_run
//! use confidant_observe::tracing_setup::{TracingConfig, init_tracing};
//!
//! // Human-readable logs at warn, no span export
//! init_tracing(&TracingConfig::default()).unwrap();
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use std::sync::OnceLock;

/// Stores the OTel tracer provider so it can be shut down cleanly on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// How the global subscriber is assembled.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. `"warn"`, `"info,confidant=debug"`).
    pub default_directive: String,
    /// Emit one JSON object per event instead of the pretty formatter.
    pub json: bool,
    /// Bridge spans to OpenTelemetry with the stdout exporter.
    pub enable_otel: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_directive: "warn".to_string(),
            json: false,
            enable_otel: false,
        }
    }
}

impl TracingConfig {
    /// Filter directive for a `-v` count and `--quiet` switch.
    pub fn directive_for(verbose: u8, quiet: bool) -> &'static str {
        match verbose {
            0 if quiet => "error",
            0 => "warn",
            1 => "info,confidant=debug",
            _ => "trace",
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// - `RUST_LOG` wins over `config.default_directive` when set.
/// - The fmt layer closes spans with timing so side calls show their latency.
/// - With `enable_otel`, spans also go to OpenTelemetry through a stdout
///   exporter (swap it for OTLP in production).
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set.
pub fn init_tracing(config: &TracingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_directive));

    let (pretty_layer, json_layer) = if config.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE);
        (None, Some(layer))
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE);
        (Some(layer), None)
    };

    let otel_layer = if config.enable_otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("confidant");

        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);

        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(pretty_layer)
        .with(json_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(())
}

/// Flush pending traces and shut down the OpenTelemetry tracer provider.
///
/// Safe to call even when OTel was not enabled (no-op in that case).
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {e}");
        }
    }
}
