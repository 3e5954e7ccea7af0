//! Tracing initialization driven by the application settings.
//!
//! A single compact fmt layer with an env-filter: `RUST_LOG` wins when set,
//! otherwise the configured level applies. Initialization is idempotent so
//! tests and embedding applications can call it freely.

use crate::config::Settings;
use crate::error::{MeterError, MeterResult};
use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Initialize tracing from the loaded settings.
pub fn init_from_settings(settings: &Settings) -> MeterResult<()> {
    let level = parse_log_level(&settings.application.log_level)?;
    init(level)
}

/// Initialize tracing at the given level.
pub fn init(level: Level) -> MeterResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_filter_string(level)));

    let fmt_layer = fmt::layer()
        .compact()
        .with_target(true)
        .with_thread_names(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .or_else(|err| {
            // Already-initialized is expected when tests share a process.
            if err
                .to_string()
                .contains("a global default trace dispatcher has already been set")
            {
                Ok(())
            } else {
                Err(MeterError::Configuration(format!(
                    "failed to initialize tracing: {err}"
                )))
            }
        })
}

fn parse_log_level(level: &str) -> MeterResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(MeterError::Configuration(format!(
            "Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}

fn level_filter_string(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}
