//! Governor configuration: session length, daily limits and privileged identities.

use serde::{Deserialize, Serialize};

pub const DEFAULT_SESSION_TIMEOUT_MINUTES: u64 = 60;
pub const DEFAULT_DAILY_LIMIT: u32 = 50;
pub const PREMIUM_DAILY_LIMIT: u32 = 200;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GovernorConfig {
    /// Minutes an activation stays valid
    pub session_timeout_minutes: u64,

    /// Daily pass-through requests for regular users
    pub default_daily_limit: u32,

    /// Daily pass-through requests for premium users
    pub premium_daily_limit: u32,

    /// Identity with unlimited quota and admin rights
    pub owner_identity: Option<String>,

    /// Identities allowed to run admin commands
    pub admins: Vec<String>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            session_timeout_minutes: DEFAULT_SESSION_TIMEOUT_MINUTES,
            default_daily_limit: DEFAULT_DAILY_LIMIT,
            premium_daily_limit: PREMIUM_DAILY_LIMIT,
            owner_identity: None,
            admins: Vec::new(),
        }
    }
}

impl GovernorConfig {
    pub fn session_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_timeout_minutes as i64)
    }

    pub fn is_owner(&self, identity: &str) -> bool {
        self.owner_identity.as_deref() == Some(identity)
    }

    pub fn with_owner(mut self, identity: &str) -> Self {
        self.owner_identity = Some(identity.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GovernorConfig::default();
        assert_eq!(config.session_timeout(), chrono::Duration::minutes(60));
        assert_eq!(config.default_daily_limit, 50);
        assert_eq!(config.premium_daily_limit, 200);
        assert!(!config.is_owner("anyone"));
    }

    #[test]
    fn test_owner() {
        let config = GovernorConfig::default().with_owner("6281");
        assert!(config.is_owner("6281"));
        assert!(!config.is_owner("6282"));
    }
}
