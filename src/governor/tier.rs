//! Quota tier resolution.
//!
//! The single place that decides owner / premium / standard precedence.

use super::config::GovernorConfig;
use crate::store::{UserRecord, UNLIMITED_DAILY_LIMIT};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Owner,
    Premium,
    Standard,
}

impl Tier {
    pub fn daily_limit(&self, config: &GovernorConfig) -> u32 {
        match self {
            Tier::Owner => UNLIMITED_DAILY_LIMIT,
            Tier::Premium => config.premium_daily_limit,
            Tier::Standard => config.default_daily_limit,
        }
    }

    /// Like [`Tier::daily_limit`] but honours a per-user premium override
    pub fn limit_for(&self, user: Option<&UserRecord>, config: &GovernorConfig) -> u32 {
        match (self, user.and_then(|u| u.premium_limit)) {
            (Tier::Premium, Some(limit)) => limit,
            _ => self.daily_limit(config),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Tier::Owner)
    }
}

/// Owner beats premium beats standard
pub fn resolve_tier(identity: &str, user: Option<&UserRecord>, config: &GovernorConfig) -> Tier {
    if config.is_owner(identity) {
        Tier::Owner
    } else if user.is_some_and(|u| u.is_premium) {
        Tier::Premium
    } else {
        Tier::Standard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_wins_over_premium() {
        let config = GovernorConfig::default().with_owner("owner");
        let mut user = UserRecord::new("owner");
        user.is_premium = true;

        let tier = resolve_tier("owner", Some(&user), &config);
        assert_eq!(tier, Tier::Owner);
        assert_eq!(tier.daily_limit(&config), UNLIMITED_DAILY_LIMIT);
        assert!(tier.is_unlimited());
    }

    #[test]
    fn test_premium_and_standard() {
        let config = GovernorConfig::default();
        let mut user = UserRecord::new("6281");

        assert_eq!(resolve_tier("6281", Some(&user), &config), Tier::Standard);
        assert_eq!(Tier::Standard.daily_limit(&config), 50);

        user.is_premium = true;
        assert_eq!(resolve_tier("6281", Some(&user), &config), Tier::Premium);
        assert_eq!(Tier::Premium.daily_limit(&config), 200);
    }

    #[test]
    fn test_premium_override() {
        let config = GovernorConfig::default();
        let mut user = UserRecord::new("6281");
        user.premium_limit = Some(500);

        // Override only applies once the user is premium
        assert_eq!(Tier::Standard.limit_for(Some(&user), &config), 50);
        user.is_premium = true;
        let tier = resolve_tier("6281", Some(&user), &config);
        assert_eq!(tier.limit_for(Some(&user), &config), 500);
    }

    #[test]
    fn test_unknown_user_is_standard() {
        let config = GovernorConfig::default();
        assert_eq!(resolve_tier("nobody", None, &config), Tier::Standard);
    }
}
