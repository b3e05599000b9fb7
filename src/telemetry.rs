//! Logging initialisation.
//!
//! Logs always go to stderr. Stdout belongs to the console transport.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Filter for the configured level. `RUST_LOG` directives still apply on top.
pub fn env_filter(config: &LoggingConfig, verbose: bool) -> EnvFilter {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.level.to_lowercase()
    };
    EnvFilter::builder()
        .with_default_directive(
            level
                .parse::<tracing::Level>()
                .unwrap_or(tracing::Level::INFO)
                .into(),
        )
        .from_env_lossy()
}

/// Install the global subscriber. Fails if one is already set.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let filter = env_filter(config, verbose);
    let format = LogFormat::parse(&config.format).unwrap_or(LogFormat::Compact);

    let layer = match format {
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()?;

    tracing::debug!(
        "Logging initialized: level={}, format={:?}, verbose={}",
        config.level,
        format,
        verbose
    );
    Ok(())
}
