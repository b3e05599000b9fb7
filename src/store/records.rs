//! Persisted record types: registered users, user sessions and group sessions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Daily limit stored for the owner. Never reached in practice.
pub const UNLIMITED_DAILY_LIMIT: u32 = 999_999;

/// A registered person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub identity: String,
    pub is_premium: bool,
    pub is_admin: bool,
    /// Per-user override of the premium ceiling
    #[serde(default)]
    pub premium_limit: Option<u32>,
    pub registered_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            is_premium: false,
            is_admin: false,
            premium_limit: None,
            registered_at: Utc::now(),
        }
    }
}

/// Integration session and daily quota for one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub identity: String,
    pub is_active: bool,
    pub session_expiry: Option<DateTime<Utc>>,
    pub daily_limit: u32,
    pub usage_count: u32,
    /// Local calendar date of the last quota reset
    pub last_reset_date: NaiveDate,
    /// Owner override: no quota enforcement
    pub is_unlimited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserSession {
    /// A fresh, inactive record with zero usage
    pub fn new(identity: &str, daily_limit: u32, is_unlimited: bool, today: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            identity: identity.to_string(),
            is_active: false,
            session_expiry: None,
            daily_limit,
            usage_count: 0,
            last_reset_date: today,
            is_unlimited,
            created_at: now,
            updated_at: now,
        }
    }

    /// Stored flag is on but the expiry has passed
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.session_expiry.is_some_and(|expiry| expiry < now)
    }

    /// Quota belongs to an earlier calendar day
    pub fn needs_reset(&self, today: NaiveDate) -> bool {
        self.last_reset_date != today
    }

    pub fn is_exhausted(&self) -> bool {
        !self.is_unlimited && self.usage_count >= self.daily_limit
    }

    pub fn remaining(&self) -> Remaining {
        if self.is_unlimited {
            Remaining::Unlimited
        } else {
            Remaining::Limited(self.daily_limit.saturating_sub(self.usage_count))
        }
    }
}

/// Integration session for a group chat. Carries no quota of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSession {
    pub group_key: String,
    pub is_active: bool,
    pub activator_identity: Option<String>,
    pub session_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupSession {
    pub fn new(group_key: &str) -> Self {
        let now = Utc::now();
        Self {
            group_key: group_key.to_string(),
            is_active: false,
            activator_identity: None,
            session_expiry: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.session_expiry.is_some_and(|expiry| expiry < now)
    }
}

/// Quota left for today
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Remaining {
    Limited(u32),
    Unlimited,
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Remaining::Limited(n) => write!(f, "{}", n),
            Remaining::Unlimited => write!(f, "Unlimited"),
        }
    }
}
