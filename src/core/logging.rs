//! Structured logging setup.
//!
//! All diagnostics go to stderr through `tracing` so stdout stays clean for
//! rendered guidance and JSON envelopes that CI scripts capture. `RUST_LOG`
//! overrides the level chosen from `--verbose`.

use crate::core::error::WardenError;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(WardenError::ConfigurationError(format!(
                "unknown log format '{other}' (expected text or json)"
            ))),
        }
    }
}

fn default_filter(verbosity: u8) -> EnvFilter {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the process-wide subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init_logging(verbosity: u8, format: LogFormat) {
    let filter = default_filter(verbosity);
    let registry = tracing_subscriber::registry().with(filter);
    let _ = match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init(),
    };
}

/// Initialize logging for tests, captured by the test harness.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(default_filter(2))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_test_writer()
                .compact(),
        )
        .try_init();
}
