//! Tracing setup for the host binary.

use clap::ValueEnum;
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Initialize the tracing subscriber once for the process.
///
/// `RUST_LOG` wins over `level` when set. Output goes to stderr; stdout carries the
/// protocol.
pub fn init_tracing(level: &str, format: LogFormat) {
    TRACING_INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let result = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init(),
            LogFormat::Text => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init(),
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}
