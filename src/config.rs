// Configuration File Support
//
// TOML configuration for the relaybot governor with RELAYBOT_* environment
// overrides. Every section has defaults, so an empty or missing file is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::governor::GovernorConfig;
use crate::integration::IntegrationConfig;
use crate::rate_limit::RateLimitConfig;
use crate::router::RouterConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Sessions, daily limits and privileged identities
    pub governor: GovernorConfig,

    /// Command rate limiting
    pub rate_limit: RateLimitConfig,

    /// Command markers and routing modes
    pub router: RouterConfig,

    /// Outbound integration webhook
    pub integration: IntegrationConfig,

    /// Record persistence
    pub store: StoreConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot file. In-memory only when unset.
    pub path: Option<PathBuf>,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to serve /metrics and /health
    pub enabled: bool,

    /// Port for metrics server
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

impl Config {
    /// Load configuration from a specific path
    ///
    /// A missing file yields the defaults. Environment overrides are applied
    /// in both cases and the result is validated.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?
        } else {
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, validated
    pub fn from_env() -> Result<Self> {
        let config = Self::default().apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - RELAYBOT_LOG_LEVEL, RELAYBOT_LOG_FORMAT
    /// - RELAYBOT_SESSION_TIMEOUT (minutes)
    /// - RELAYBOT_DAILY_LIMIT_DEFAULT, RELAYBOT_DAILY_LIMIT_PREMIUM
    /// - RELAYBOT_OWNER, RELAYBOT_ADMINS (comma separated)
    /// - RELAYBOT_RATE_LIMIT_WINDOW (ms), RELAYBOT_RATE_LIMIT_DEFAULT
    /// - RELAYBOT_COMMAND_PREFIX, RELAYBOT_ALTERNATE_PREFIX
    /// - RELAYBOT_INTEGRATION_ONLY, RELAYBOT_AUTO_REGISTER
    /// - RELAYBOT_INTEGRATION_URL, RELAYBOT_INTEGRATION_API_KEY
    /// - RELAYBOT_STORE_PATH
    /// - RELAYBOT_METRICS_ENABLED, RELAYBOT_METRICS_PORT
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Overrides from any key lookup. Unparseable values are ignored.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Logging overrides
        if let Some(level) = lookup("RELAYBOT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("RELAYBOT_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Governor overrides
        if let Some(minutes) = parsed(&lookup, "RELAYBOT_SESSION_TIMEOUT") {
            self.governor.session_timeout_minutes = minutes;
        }
        if let Some(limit) = parsed(&lookup, "RELAYBOT_DAILY_LIMIT_DEFAULT") {
            self.governor.default_daily_limit = limit;
        }
        if let Some(limit) = parsed(&lookup, "RELAYBOT_DAILY_LIMIT_PREMIUM") {
            self.governor.premium_daily_limit = limit;
        }
        if let Some(owner) = lookup("RELAYBOT_OWNER") {
            let owner = owner.trim().to_string();
            self.governor.owner_identity = (!owner.is_empty()).then_some(owner);
        }
        if let Some(admins) = lookup("RELAYBOT_ADMINS") {
            self.governor.admins = admins
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect();
        }

        // Rate limit overrides
        if let Some(window) = parsed(&lookup, "RELAYBOT_RATE_LIMIT_WINDOW") {
            self.rate_limit.window_ms = window;
        }
        if let Some(limit) = parsed(&lookup, "RELAYBOT_RATE_LIMIT_DEFAULT") {
            self.rate_limit.default_limit = limit;
        }

        // Router overrides
        if let Some(prefix) = lookup("RELAYBOT_COMMAND_PREFIX") {
            self.router.command_prefix = prefix;
        }
        if let Some(prefix) = lookup("RELAYBOT_ALTERNATE_PREFIX") {
            self.router.alternate_prefix = prefix;
        }
        if let Some(only) = parsed(&lookup, "RELAYBOT_INTEGRATION_ONLY") {
            self.router.integration_only = only;
        }
        if let Some(auto) = parsed(&lookup, "RELAYBOT_AUTO_REGISTER") {
            self.router.auto_register = auto;
        }

        // Integration overrides
        if let Some(url) = lookup("RELAYBOT_INTEGRATION_URL") {
            self.integration.url = url;
        }
        if let Some(key) = lookup("RELAYBOT_INTEGRATION_API_KEY") {
            self.integration.api_key = key;
        }

        // Store overrides
        if let Some(path) = lookup("RELAYBOT_STORE_PATH") {
            self.store.path = (!path.trim().is_empty()).then(|| PathBuf::from(path));
        }

        // Metrics overrides
        if let Some(enabled) = parsed(&lookup, "RELAYBOT_METRICS_ENABLED") {
            self.metrics.enabled = enabled;
        }
        if let Some(port) = parsed(&lookup, "RELAYBOT_METRICS_PORT") {
            self.metrics.port = port;
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        // Validate logging level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        // Validate logging format
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        // Validate governor configuration
        if self.governor.session_timeout_minutes == 0 {
            anyhow::bail!("Session timeout must be > 0 minutes");
        }
        if self.governor.premium_daily_limit < self.governor.default_daily_limit {
            anyhow::bail!(
                "Premium daily limit ({}) must not be below the default daily limit ({})",
                self.governor.premium_daily_limit,
                self.governor.default_daily_limit
            );
        }

        // Validate rate limit configuration
        if self.rate_limit.window_ms == 0 {
            anyhow::bail!("Rate limit window must be > 0 ms");
        }
        if self.rate_limit.default_limit == 0 {
            anyhow::bail!("Default rate limit must be > 0");
        }
        if let Some((class, _)) = self
            .rate_limit
            .class_limits
            .iter()
            .find(|(_, limit)| **limit == 0)
        {
            anyhow::bail!("Rate limit for command class '{}' must be > 0", class);
        }

        // Validate command markers
        let primary = &self.router.command_prefix;
        let alternate = &self.router.alternate_prefix;
        if primary.trim().is_empty() || alternate.trim().is_empty() {
            anyhow::bail!("Command prefixes must not be empty");
        }
        if primary == alternate {
            anyhow::bail!("Command prefix and alternate prefix must differ");
        }

        // Validate metrics configuration
        if self.metrics.port == 0 {
            anyhow::bail!("Metrics port must be > 0");
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|value| value.trim().parse().ok())
}
