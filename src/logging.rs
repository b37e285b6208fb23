//! Structured logging setup
//!
//! Logs always go to stderr: stdout carries the protocol stream when serving.

use crate::config::{ConfigError, LoggingConfig};
use anyhow::{Context, Result};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            _ => Err(ConfigError::InvalidLogFormat(s.to_string())),
        }
    }
}

/// Build the level filter; `RUST_LOG` directives win over the configured level
pub fn env_filter(config: &LoggingConfig, verbose: bool) -> Result<EnvFilter, ConfigError> {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.level()?
    };

    Ok(EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy())
}

/// Install the global subscriber
///
/// # Errors
///
/// Fails on an invalid level or format, or if a subscriber is already set.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let filter = env_filter(config, verbose)?;
    let format: LogFormat = config.format.parse()?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    }
    .map_err(|e| anyhow::anyhow!(e))
    .context("Failed to install tracing subscriber")
}
