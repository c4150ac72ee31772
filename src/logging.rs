// src/logging.rs

//! Logging setup for `procvisor` using `tracing` + `tracing-subscriber`.
//!
//! The filter is chosen in this order:
//! 1. `--log-level` on the CLI, applied to the `procvisor` target
//! 2. `PROCVISOR_LOG`: either a bare level (`debug`), again scoped to
//!    `procvisor`, or a full `EnvFilter` directive string
//!    (`procvisor=trace,tokio=debug`)
//! 3. `procvisor=info`
//!
//! Other crates stay silent unless a directive names them. Logs go to stderr
//! so stdout carries only child output.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Environment variable read when no CLI level is given.
pub const LOG_ENV: &str = "PROCVISOR_LOG";

const CRATE_TARGET: &str = "procvisor";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV).ok();
    let filter = build_filter(cli_level, env_value.as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

/// Resolve the filter from the CLI level and the raw `PROCVISOR_LOG` value.
///
/// An unparseable environment value falls back to the default.
pub fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    if let Some(lvl) = cli_level {
        return crate_filter(level_from_log_level(lvl));
    }

    match env_value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => match parse_level_str(value) {
            Some(level) => crate_filter(level),
            None => EnvFilter::try_new(value).unwrap_or_else(|_| crate_filter(Level::INFO)),
        },
        None => crate_filter(Level::INFO),
    }
}

fn crate_filter(level: Level) -> EnvFilter {
    let level = level.as_str().to_ascii_lowercase();
    EnvFilter::new(format!("{CRATE_TARGET}={level}"))
}

fn level_from_log_level(lvl: LogLevel) -> Level {
    match lvl {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}

/// Parse a bare level name as accepted by `PROCVISOR_LOG`.
pub fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
