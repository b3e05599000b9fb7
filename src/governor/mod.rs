//! Per-identity Usage Governor
//!
//! Sessions switch the free-form pass-through on for a user or a group.
//! Quota is always charged to the individual sender.
//!
//! ```text
//! activate ──► UserSession { is_active, session_expiry, usage_count, .. }
//!                  │
//!   is_active ─────┤ lazy expiry, daily reset, limit check
//!                  │
//!   reserve ───────┘ reload + increment under the identity lock,
//!                    released again if delivery fails
//!
//! activate_for_group ──► GroupSession { is_active, activator_identity, .. }
//!   is_active_for_group: group gate only, never quota
//! ```

pub mod accountant;
pub mod clock;
pub mod config;
pub mod error;
pub mod locks;
pub mod session;
pub mod tier;

pub use accountant::{Reservation, UsageAccountant};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GovernorConfig;
pub use error::{GovernorError, GovernorResult, InactiveReason};
pub use session::{
    ActivateOptions, Activation, Activity, GroupStatus, SessionGovernor, SessionState, UserStatus,
};
pub use tier::{resolve_tier, Tier};
