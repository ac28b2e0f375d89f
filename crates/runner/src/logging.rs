//! Tracing subscriber setup

use crate::settings::{LogFormat, LoggingSettings};
use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Parse a level name, rejecting anything tracing does not know
pub fn parse_level(level: &str) -> Result<LevelFilter> {
    level
        .trim()
        .parse::<LevelFilter>()
        .map_err(|_| anyhow::anyhow!("Invalid log level {:?} (expected off, error, warn, info, debug or trace)", level))
}

/// Build the filter: `RUST_LOG` wins over the configured level
pub fn build_filter(settings: &LoggingSettings) -> Result<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(&directives)
            .with_context(|| format!("Invalid {} directives {:?}", EnvFilter::DEFAULT_ENV, directives)),
        _ => {
            let level = parse_level(&settings.level)?;
            Ok(EnvFilter::default().add_directive(level.into()))
        }
    }
}

pub fn init(settings: &LoggingSettings) -> Result<()> {
    let filter = build_filter(settings)?;
    let registry = tracing_subscriber::registry().with(filter);

    match settings.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    }
    .context("Failed to install tracing subscriber")
}
