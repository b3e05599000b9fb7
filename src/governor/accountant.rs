//! Usage accounting against the quota owner.
//!
//! The owner is always the individual sender, also inside groups.

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::error::{GovernorError, GovernorResult, InactiveReason};
use super::session::{ActivateOptions, Activity, SessionGovernor};
use crate::metrics::USAGE_RECORDED_TOTAL;
use crate::store::{Remaining, UserSession};

#[derive(Debug, Clone)]
pub struct UsageAccountant {
    governor: SessionGovernor,
}

impl UsageAccountant {
    pub fn new(governor: SessionGovernor) -> Self {
        Self { governor }
    }

    pub fn governor(&self) -> &SessionGovernor {
        &self.governor
    }

    /// Find or create the sender's session for a message that is allowed through.
    ///
    /// An inactive or expired session is force-activated because the
    /// surrounding chat already enabled the pass-through.
    pub async fn resolve_quota_owner(&self, sender: &str) -> GovernorResult<UserSession> {
        match self.governor.is_active(sender).await? {
            Activity::Active(session) => Ok(session),
            Activity::Inactive(InactiveReason::NotRegistered) => {
                Err(GovernorError::NotRegistered(sender.to_string()))
            }
            Activity::Inactive(reason) => {
                debug!(identity = sender, %reason, "Activating quota owner");
                let activation = self
                    .governor
                    .activate(sender, ActivateOptions::forced())
                    .await?;
                Ok(activation.session)
            }
        }
    }

    /// Count one pass-through request and report what is left.
    pub async fn record_usage(&self, identity: &str) -> GovernorResult<Remaining> {
        Ok(self.reserve(identity).await?.remaining)
    }

    /// Take one slot of today's quota before the request leaves.
    ///
    /// Reloads the record under the identity lock, so concurrent messages
    /// from the same sender can never hold more slots than the limit.
    pub async fn reserve(&self, identity: &str) -> GovernorResult<Reservation> {
        let _guard = self.governor.lock_identity(identity).await;
        let store = self.governor.store();

        let user = store
            .find_user(identity)
            .await?
            .ok_or_else(|| GovernorError::NotRegistered(identity.to_string()))?;
        let mut session = store
            .find_user_session(identity)
            .await?
            .ok_or_else(|| GovernorError::NotActive(identity.to_string()))?;

        let reset = self.governor.apply_daily_reset(&mut session);
        let (_, tier_changed) = self.governor.sync_tier(&user, &mut session);
        if reset || tier_changed {
            store.update_user_session(&session).await?;
        }

        if session.is_exhausted() {
            warn!(identity, usage = session.usage_count, "Usage rejected at limit");
            return Err(GovernorError::LimitReached(identity.to_string()));
        }

        let updated = store.increment_usage(identity).await?;
        USAGE_RECORDED_TOTAL.inc();

        let remaining = updated.remaining();
        debug!(identity, usage = updated.usage_count, %remaining, "Usage recorded");
        Ok(Reservation {
            remaining,
            day: updated.last_reset_date,
        })
    }

    /// Give back a slot whose request never reached the integration.
    ///
    /// A no-op once the quota has rolled over to a new day.
    pub async fn release(&self, identity: &str, reservation: &Reservation) -> GovernorResult<()> {
        let _guard = self.governor.lock_identity(identity).await;
        let store = self.governor.store();

        let Some(mut session) = store.find_user_session(identity).await? else {
            return Ok(());
        };
        if session.last_reset_date != reservation.day || session.usage_count == 0 {
            return Ok(());
        }

        session.usage_count -= 1;
        store.update_user_session(&session).await?;
        debug!(identity, usage = session.usage_count, "Usage released");
        Ok(())
    }
}

/// One slot of a day's quota held by an in-flight request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub remaining: Remaining,
    /// Quota day the slot was taken from
    pub day: NaiveDate,
}
