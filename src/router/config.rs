//! Router configuration: command markers and routing modes.

use serde::{Deserialize, Serialize};

pub const DEFAULT_COMMAND_PREFIX: &str = "!";
pub const DEFAULT_ALTERNATE_PREFIX: &str = "/";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    /// Primary command marker
    pub command_prefix: String,

    /// Secondary command marker
    pub alternate_prefix: String,

    /// Commands that skip the rate limiter
    pub always_allowed: Vec<String>,

    /// Send every message to the integration and disable command dispatch
    pub integration_only: bool,

    /// Register unknown senders on the fly in integration-only mode
    pub auto_register: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            alternate_prefix: DEFAULT_ALTERNATE_PREFIX.to_string(),
            always_allowed: vec!["status".to_string(), "help".to_string()],
            integration_only: false,
            auto_register: false,
        }
    }
}

impl RouterConfig {
    pub fn is_always_allowed(&self, command: &str) -> bool {
        self.always_allowed.iter().any(|c| c.eq_ignore_ascii_case(command))
    }

    /// Body with the command marker removed, if it carries one
    pub fn strip_prefix<'a>(&self, body: &'a str) -> Option<&'a str> {
        body.strip_prefix(self.command_prefix.as_str())
            .or_else(|| body.strip_prefix(self.alternate_prefix.as_str()))
    }
}
