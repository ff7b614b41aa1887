//! # Structured Logging
//!
//! Environment-aware tracing setup. Console output by default; set
//! `MARKETSYNC_LOG_FORMAT=json` for machine-readable lines. `RUST_LOG`
//! overrides the environment-derived level.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process. Safe to call from tests
/// and binaries alike; later calls are no-ops, as is running under a host
/// that already installed a global subscriber.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level(&environment)));

        let json = std::env::var("MARKETSYNC_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let init_result = if json {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true).with_ansi(false).json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true))
                .try_init()
        };

        if init_result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        } else {
            tracing::info!(environment = %environment, "Structured logging initialized");
        }
    });
}

fn environment() -> String {
    std::env::var("MARKETSYNC_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn default_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}
