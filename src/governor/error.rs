//! Governor Error Types
//!
//! Quota and session errors are terminal for the message that triggered them.

use crate::store::StoreError;
use std::fmt;

/// Error types for governor operations
#[derive(Debug, thiserror::Error)]
pub enum GovernorError {
    /// Identity has no user record
    #[error("{0} is not registered")]
    NotRegistered(String),

    /// Registration requested twice
    #[error("{0} is already registered")]
    AlreadyRegistered(String),

    /// Daily quota used up for today
    #[error("Daily usage limit reached for {0}")]
    LimitReached(String),

    /// Session expiry has passed
    #[error("Integration session expired for {0}")]
    SessionExpired(String),

    /// Deactivation or usage requested without an active session
    #[error("Integration is not active for {0}")]
    NotActive(String),

    /// Outbound sink call failed or timed out
    #[error("Integration sink failure: {0}")]
    UpstreamIntegrationFailure(String),

    /// Store read or write failed
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl GovernorError {
    /// Text shown to the person whose message was rejected
    pub fn user_message(&self) -> String {
        match self {
            GovernorError::NotRegistered(_) => {
                "You need to register first before using the integration.".to_string()
            }
            GovernorError::AlreadyRegistered(_) => "You are already registered.".to_string(),
            GovernorError::LimitReached(_) => {
                "Daily usage limit reached. Please try again tomorrow or upgrade to premium."
                    .to_string()
            }
            GovernorError::SessionExpired(_) => {
                "Your integration session has expired. Please activate again.".to_string()
            }
            GovernorError::NotActive(_) => {
                "The integration is not currently active.".to_string()
            }
            GovernorError::UpstreamIntegrationFailure(_) | GovernorError::StoreUnavailable(_) => {
                "There was an error processing your message. Please try again later.".to_string()
            }
        }
    }

    /// Metric / log label
    pub fn kind(&self) -> &'static str {
        match self {
            GovernorError::NotRegistered(_) => "not_registered",
            GovernorError::AlreadyRegistered(_) => "already_registered",
            GovernorError::LimitReached(_) => "limit_reached",
            GovernorError::SessionExpired(_) => "expired",
            GovernorError::NotActive(_) => "not_active",
            GovernorError::UpstreamIntegrationFailure(_) => "upstream_failure",
            GovernorError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

pub type GovernorResult<T> = std::result::Result<T, GovernorError>;

/// Why a session check came back inactive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactiveReason {
    NotRegistered,
    NotActivated,
    Expired,
    LimitReached,
}

impl fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InactiveReason::NotRegistered => "not_registered",
            InactiveReason::NotActivated => "not_activated",
            InactiveReason::Expired => "expired",
            InactiveReason::LimitReached => "limit_reached",
        };
        f.write_str(s)
    }
}

impl InactiveReason {
    pub fn into_error(self, key: &str) -> GovernorError {
        match self {
            InactiveReason::NotRegistered => GovernorError::NotRegistered(key.to_string()),
            InactiveReason::NotActivated => GovernorError::NotActive(key.to_string()),
            InactiveReason::Expired => GovernorError::SessionExpired(key.to_string()),
            InactiveReason::LimitReached => GovernorError::LimitReached(key.to_string()),
        }
    }
}
