//! Session Governor
//!
//! Owns activation, deactivation, lazy expiry and the daily quota reset for
//! user and group integration sessions.
//!
//! Expiry is evaluated on read. Nothing runs in the background to turn
//! sessions off, so an expired record keeps `is_active = true` in the store
//! until the next check flips it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::config::GovernorConfig;
use super::error::{GovernorError, GovernorResult, InactiveReason};
use super::locks::KeyedLocks;
use super::tier::{resolve_tier, Tier};
use crate::store::{
    GroupSession, QuotaStore, Remaining, StoreError, UserRecord, UserSession,
    UNLIMITED_DAILY_LIMIT,
};

/// Options for [`SessionGovernor::activate`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivateOptions {
    /// Internal activation: logged at debug level only
    pub silent: bool,
    /// Activate even when today's quota is used up
    pub force_create: bool,
}

impl ActivateOptions {
    pub fn forced() -> Self {
        Self {
            silent: true,
            force_create: true,
        }
    }
}

/// Outcome of a successful activation
#[derive(Debug, Clone)]
pub struct Activation<T> {
    pub session: T,
    /// A new record was created
    pub created: bool,
    /// The session was already active and has been refreshed
    pub refreshed: bool,
}

/// Result of a session check
#[derive(Debug, Clone, PartialEq)]
pub enum Activity<T> {
    Active(T),
    Inactive(InactiveReason),
}

impl<T> Activity<T> {
    pub fn is_active(&self) -> bool {
        matches!(self, Activity::Active(_))
    }

    pub fn reason(&self) -> Option<InactiveReason> {
        match self {
            Activity::Active(_) => None,
            Activity::Inactive(reason) => Some(*reason),
        }
    }

    pub fn session(&self) -> Option<&T> {
        match self {
            Activity::Active(session) => Some(session),
            Activity::Inactive(_) => None,
        }
    }
}

/// Display state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotConfigured,
    Active,
    Inactive,
    Expired,
}

/// Read-only view of a user's quota and session
#[derive(Debug, Clone, Serialize)]
pub struct UserStatus {
    pub identity: String,
    pub state: SessionState,
    pub tier: Tier,
    pub daily_limit: Option<u32>,
    pub usage_count: u32,
    pub remaining: Remaining,
    pub session_minutes_left: Option<i64>,
    pub last_reset_date: Option<NaiveDate>,
}

/// Read-only view of a group session
#[derive(Debug, Clone, Serialize)]
pub struct GroupStatus {
    pub group_key: String,
    pub state: SessionState,
    pub activated_by: Option<String>,
    pub activator_premium: bool,
    pub session_minutes_left: Option<i64>,
}

/// Session and quota state machine over a [`QuotaStore`]
#[derive(Clone)]
pub struct SessionGovernor {
    store: Arc<dyn QuotaStore>,
    config: Arc<GovernorConfig>,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyedLocks>,
}

impl std::fmt::Debug for SessionGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGovernor")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl SessionGovernor {
    pub fn new(store: Arc<dyn QuotaStore>, config: GovernorConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn QuotaStore>,
        config: GovernorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config: Arc::new(config),
            clock,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<dyn QuotaStore> {
        &self.store
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Serialise read-modify-write for one identity
    pub(crate) async fn lock_identity(&self, identity: &str) -> OwnedMutexGuard<()> {
        self.locks.lock(&format!("user:{}", identity)).await
    }

    async fn lock_group(&self, group_key: &str) -> OwnedMutexGuard<()> {
        self.locks.lock(&format!("group:{}", group_key)).await
    }

    fn session_expiry(&self) -> DateTime<Utc> {
        self.clock.now() + self.config.session_timeout()
    }

    /// Zero the counter when the stored reset date is not today. Returns true if reset.
    pub(crate) fn apply_daily_reset(&self, session: &mut UserSession) -> bool {
        let today = self.clock.today();
        if session.needs_reset(today) {
            session.usage_count = 0;
            session.last_reset_date = today;
            true
        } else {
            false
        }
    }

    /// Bring the cached unlimited flag in line with the current tier.
    /// Returns the tier and whether the session changed.
    pub(crate) fn sync_tier(&self, user: &UserRecord, session: &mut UserSession) -> (Tier, bool) {
        let tier = resolve_tier(&session.identity, Some(user), &self.config);
        if session.is_unlimited == tier.is_unlimited() {
            return (tier, false);
        }

        debug!(
            identity = %session.identity,
            unlimited = tier.is_unlimited(),
            "Session tier changed"
        );
        session.is_unlimited = tier.is_unlimited();
        session.daily_limit = tier.limit_for(Some(user), &self.config);
        (tier, true)
    }

    // ----- users -----

    pub async fn find_user(&self, identity: &str) -> GovernorResult<Option<UserRecord>> {
        Ok(self.store.find_user(identity).await?)
    }

    async fn require_user(&self, identity: &str) -> GovernorResult<UserRecord> {
        self.store
            .find_user(identity)
            .await?
            .ok_or_else(|| GovernorError::NotRegistered(identity.to_string()))
    }

    /// Create a user record
    pub async fn register(&self, identity: &str) -> GovernorResult<UserRecord> {
        let mut user = UserRecord::new(identity);
        user.is_admin = self.config.admins.iter().any(|a| a == identity);

        match self.store.create_user(user).await {
            Ok(user) => {
                info!(identity, "User registered");
                Ok(user)
            }
            Err(StoreError::Conflict(_)) => {
                Err(GovernorError::AlreadyRegistered(identity.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Return the existing user or register a new one
    pub async fn register_if_absent(&self, identity: &str) -> GovernorResult<UserRecord> {
        match self.register(identity).await {
            Err(GovernorError::AlreadyRegistered(_)) => self.require_user(identity).await,
            other => other,
        }
    }

    pub async fn resolve_tier(&self, identity: &str) -> GovernorResult<Tier> {
        let user = self.store.find_user(identity).await?;
        Ok(resolve_tier(identity, user.as_ref(), &self.config))
    }

    /// Owner, configured admin, or a user flagged admin
    pub async fn is_admin(&self, identity: &str) -> GovernorResult<bool> {
        if self.config.is_owner(identity) || self.config.admins.iter().any(|a| a == identity) {
            return Ok(true);
        }
        Ok(self
            .store
            .find_user(identity)
            .await?
            .is_some_and(|u| u.is_admin))
    }

    // ----- user sessions -----

    /// Turn the pass-through on for `identity`
    pub async fn activate(
        &self,
        identity: &str,
        options: ActivateOptions,
    ) -> GovernorResult<Activation<UserSession>> {
        let _guard = self.lock_identity(identity).await;

        let user = self.require_user(identity).await?;
        let tier = resolve_tier(identity, Some(&user), &self.config);
        let daily_limit = tier.limit_for(Some(&user), &self.config);
        let expiry = self.session_expiry();
        let now = self.clock.now();

        let Some(mut session) = self.store.find_user_session(identity).await? else {
            let mut session =
                UserSession::new(identity, daily_limit, tier.is_unlimited(), self.clock.today());
            session.is_active = true;
            session.session_expiry = Some(expiry);
            let session = self.store.create_user_session(session).await?;
            self.log_activation(identity, options, "created");
            return Ok(Activation {
                session,
                created: true,
                refreshed: false,
            });
        };

        let refreshed = session.is_active && !session.is_expired_at(now);
        self.apply_daily_reset(&mut session);

        if !tier.is_unlimited() && session.usage_count >= session.daily_limit && !options.force_create
        {
            debug!(identity, usage = session.usage_count, "Activation refused, limit reached");
            return Err(GovernorError::LimitReached(identity.to_string()));
        }

        // Tier may have changed since the record was written
        session.daily_limit = daily_limit;
        session.is_unlimited = tier.is_unlimited();
        session.session_expiry = Some(expiry);
        session.is_active = true;
        self.store.update_user_session(&session).await?;

        self.log_activation(identity, options, if refreshed { "refreshed" } else { "reactivated" });
        Ok(Activation {
            session,
            created: false,
            refreshed,
        })
    }

    fn log_activation(&self, identity: &str, options: ActivateOptions, how: &str) {
        if options.silent {
            debug!(identity, how, "Integration session activated");
        } else {
            info!(identity, how, "Integration session activated");
        }
    }

    /// Turn the pass-through off for `identity`
    pub async fn deactivate(&self, identity: &str) -> GovernorResult<UserSession> {
        let _guard = self.lock_identity(identity).await;

        self.require_user(identity).await?;
        let mut session = match self.store.find_user_session(identity).await? {
            Some(session) if session.is_active => session,
            _ => return Err(GovernorError::NotActive(identity.to_string())),
        };

        session.is_active = false;
        session.session_expiry = None;
        self.store.update_user_session(&session).await?;

        info!(identity, "Integration session deactivated");
        Ok(session)
    }

    /// Whether free-form messages from `identity` may pass through right now.
    ///
    /// Flips expired sessions off and applies the daily reset. A session at
    /// its limit stays switched on but reports `LimitReached`.
    pub async fn is_active(&self, identity: &str) -> GovernorResult<Activity<UserSession>> {
        let _guard = self.lock_identity(identity).await;

        let Some(user) = self.store.find_user(identity).await? else {
            return Ok(Activity::Inactive(InactiveReason::NotRegistered));
        };
        let mut session = match self.store.find_user_session(identity).await? {
            Some(session) if session.is_active => session,
            _ => return Ok(Activity::Inactive(InactiveReason::NotActivated)),
        };

        if session.is_expired_at(self.clock.now()) {
            session.is_active = false;
            session.session_expiry = None;
            self.store.update_user_session(&session).await?;
            debug!(identity, "Integration session expired");
            return Ok(Activity::Inactive(InactiveReason::Expired));
        }

        let reset = self.apply_daily_reset(&mut session);
        let (_, tier_changed) = self.sync_tier(&user, &mut session);
        if reset || tier_changed {
            self.store.update_user_session(&session).await?;
        }
        if reset {
            debug!(identity, "Daily usage reset");
        }

        if session.is_exhausted() {
            return Ok(Activity::Inactive(InactiveReason::LimitReached));
        }

        Ok(Activity::Active(session))
    }

    /// Mark the user premium and lift their stored limit
    pub async fn upgrade_to_premium(
        &self,
        identity: &str,
        limit: Option<u32>,
    ) -> GovernorResult<UserSession> {
        let _guard = self.lock_identity(identity).await;

        let mut user = self.require_user(identity).await?;
        let is_owner = self.config.is_owner(identity);
        let new_limit = if is_owner {
            UNLIMITED_DAILY_LIMIT
        } else {
            limit.unwrap_or(self.config.premium_daily_limit)
        };

        user.is_premium = true;
        user.premium_limit = limit.filter(|_| !is_owner);
        self.store.update_user(&user).await?;

        let session = match self.store.find_user_session(identity).await? {
            Some(mut session) => {
                session.daily_limit = new_limit;
                session.is_unlimited = is_owner;
                self.store.update_user_session(&session).await?;
                session
            }
            None => {
                let session = UserSession::new(identity, new_limit, is_owner, self.clock.today());
                self.store.create_user_session(session).await?
            }
        };

        info!(identity, daily_limit = new_limit, "User upgraded to premium");
        Ok(session)
    }

    /// Read-only status. Reports expiry without persisting the flip.
    pub async fn status_for_user(&self, identity: &str) -> GovernorResult<UserStatus> {
        let user = self.require_user(identity).await?;
        let tier = resolve_tier(identity, Some(&user), &self.config);
        let now = self.clock.now();

        let Some(session) = self.store.find_user_session(identity).await? else {
            let limit = tier.limit_for(Some(&user), &self.config);
            return Ok(UserStatus {
                identity: identity.to_string(),
                state: SessionState::NotConfigured,
                tier,
                daily_limit: (!tier.is_unlimited()).then_some(limit),
                usage_count: 0,
                remaining: if tier.is_unlimited() {
                    Remaining::Unlimited
                } else {
                    Remaining::Limited(limit)
                },
                session_minutes_left: None,
                last_reset_date: None,
            });
        };

        let mut session = session;
        self.sync_tier(&user, &mut session);

        let state = session_state(session.is_active, session.session_expiry, now);
        let usage_count = if session.needs_reset(self.clock.today()) {
            0
        } else {
            session.usage_count
        };
        let remaining = if tier.is_unlimited() {
            Remaining::Unlimited
        } else {
            Remaining::Limited(session.daily_limit.saturating_sub(usage_count))
        };

        Ok(UserStatus {
            identity: identity.to_string(),
            state,
            tier,
            daily_limit: (!matches!(remaining, Remaining::Unlimited)).then_some(session.daily_limit),
            usage_count,
            remaining,
            session_minutes_left: minutes_left(state, session.session_expiry, now),
            last_reset_date: Some(session.last_reset_date),
        })
    }

    // ----- group sessions -----

    /// Turn the pass-through on for a group. Does not touch any user session.
    pub async fn activate_for_group(
        &self,
        group_key: &str,
        activator: &str,
    ) -> GovernorResult<Activation<GroupSession>> {
        self.require_user(activator).await?;
        let _guard = self.lock_group(group_key).await;

        let expiry = self.session_expiry();
        let now = self.clock.now();

        let (session, created, refreshed) = match self.store.find_group_session(group_key).await? {
            Some(mut session) => {
                let refreshed = session.is_active && !session.is_expired_at(now);
                session.is_active = true;
                session.activator_identity = Some(activator.to_string());
                session.session_expiry = Some(expiry);
                self.store.update_group_session(&session).await?;
                (session, false, refreshed)
            }
            None => {
                let mut session = GroupSession::new(group_key);
                session.is_active = true;
                session.activator_identity = Some(activator.to_string());
                session.session_expiry = Some(expiry);
                (self.store.create_group_session(session).await?, true, false)
            }
        };

        info!(group_key, activator, "Group integration session activated");
        Ok(Activation {
            session,
            created,
            refreshed,
        })
    }

    pub async fn deactivate_for_group(
        &self,
        group_key: &str,
        identity: &str,
    ) -> GovernorResult<GroupSession> {
        self.require_user(identity).await?;
        let _guard = self.lock_group(group_key).await;

        let mut session = match self.store.find_group_session(group_key).await? {
            Some(session) if session.is_active => session,
            _ => return Err(GovernorError::NotActive(group_key.to_string())),
        };

        session.is_active = false;
        session.session_expiry = None;
        self.store.update_group_session(&session).await?;

        info!(group_key, identity, "Group integration session deactivated");
        Ok(session)
    }

    /// Group-level gate only. Never looks at anyone's quota.
    pub async fn is_active_for_group(
        &self,
        group_key: &str,
    ) -> GovernorResult<Activity<GroupSession>> {
        let _guard = self.lock_group(group_key).await;

        let mut session = match self.store.find_group_session(group_key).await? {
            Some(session) if session.is_active => session,
            _ => return Ok(Activity::Inactive(InactiveReason::NotActivated)),
        };

        if session.is_expired_at(self.clock.now()) {
            session.is_active = false;
            session.session_expiry = None;
            self.store.update_group_session(&session).await?;
            debug!(group_key, "Group integration session expired");
            return Ok(Activity::Inactive(InactiveReason::Expired));
        }

        Ok(Activity::Active(session))
    }

    /// Upgrade whoever activated the group. Members keep their own quotas.
    pub async fn upgrade_group_to_premium(&self, group_key: &str) -> GovernorResult<UserSession> {
        let group = self
            .store
            .find_group_session(group_key)
            .await?
            .ok_or_else(|| GovernorError::NotActive(group_key.to_string()))?;

        let Some(activator) = group.activator_identity else {
            warn!(group_key, "Group has no activator to upgrade");
            return Err(GovernorError::NotActive(group_key.to_string()));
        };

        self.upgrade_to_premium(&activator, None).await
    }

    pub async fn status_for_group(&self, group_key: &str) -> GovernorResult<GroupStatus> {
        let now = self.clock.now();

        let Some(session) = self.store.find_group_session(group_key).await? else {
            return Ok(GroupStatus {
                group_key: group_key.to_string(),
                state: SessionState::NotConfigured,
                activated_by: None,
                activator_premium: false,
                session_minutes_left: None,
            });
        };

        let activator_premium = match session.activator_identity.as_deref() {
            Some(activator) => {
                self.config.is_owner(activator)
                    || self
                        .store
                        .find_user(activator)
                        .await?
                        .is_some_and(|u| u.is_premium)
            }
            None => false,
        };
        let state = session_state(session.is_active, session.session_expiry, now);

        Ok(GroupStatus {
            group_key: group_key.to_string(),
            state,
            activated_by: session.activator_identity,
            activator_premium,
            session_minutes_left: minutes_left(state, session.session_expiry, now),
        })
    }
}

fn session_state(is_active: bool, expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> SessionState {
    match (is_active, expiry) {
        (false, _) => SessionState::Inactive,
        (true, Some(expiry)) if expiry < now => SessionState::Expired,
        (true, _) => SessionState::Active,
    }
}

fn minutes_left(
    state: SessionState,
    expiry: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<i64> {
    match (state, expiry) {
        (SessionState::Active, Some(expiry)) => {
            let secs = (expiry - now).num_seconds();
            Some((secs + 30) / 60)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::Duration;

    struct Fixture {
        store: MemoryStore,
        clock: ManualClock,
        governor: SessionGovernor,
    }

    fn fixture_with(config: GovernorConfig) -> Fixture {
        let store = MemoryStore::new();
        let clock = ManualClock::default();
        let governor =
            SessionGovernor::with_clock(Arc::new(store.clone()), config, Arc::new(clock.clone()));
        Fixture {
            store,
            clock,
            governor,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(GovernorConfig::default().with_owner("owner"))
    }

    async fn seed_session(f: &Fixture, identity: &str, usage: u32, limit: u32, days_ago: u64) {
        let today = f.clock.today();
        let mut session = f
            .store
            .find_user_session(identity)
            .await
            .unwrap()
            .unwrap_or_else(|| UserSession::new(identity, limit, false, today));
        session.usage_count = usage;
        session.daily_limit = limit;
        session.last_reset_date = today - chrono::Days::new(days_ago);
        if f.store.find_user_session(identity).await.unwrap().is_some() {
            f.store.update_user_session(&session).await.unwrap();
        } else {
            f.store.create_user_session(session).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_activate_requires_registration() {
        let f = fixture();
        let err = f
            .governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GovernorError::NotRegistered(_)));
    }

    #[tokio::test]
    async fn test_activate_creates_session() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();

        let activation = f
            .governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap();

        assert!(activation.created);
        assert!(activation.session.is_active);
        assert_eq!(activation.session.daily_limit, 50);
        assert_eq!(activation.session.usage_count, 0);
        assert_eq!(
            activation.session.session_expiry,
            Some(f.clock.now() + Duration::minutes(60))
        );
    }

    #[tokio::test]
    async fn test_activate_twice_is_idempotent() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();

        let first = f
            .governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap();
        let second = f
            .governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap();

        assert!(first.session.is_active);
        assert!(second.session.is_active);
        assert!(!second.created);
        assert!(second.refreshed);
        assert_eq!(f.store.user_session_count().await, 1);
    }

    #[tokio::test]
    async fn test_activate_refused_at_limit_same_day() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();
        seed_session(&f, "6281", 50, 50, 0).await;

        let err = f
            .governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GovernorError::LimitReached(_)));

        let stored = f.store.find_user_session("6281").await.unwrap().unwrap();
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn test_force_create_activates_at_limit() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();
        seed_session(&f, "6281", 50, 50, 0).await;

        let activation = f
            .governor
            .activate("6281", ActivateOptions::forced())
            .await
            .unwrap();
        assert!(activation.session.is_active);
        assert_eq!(activation.session.usage_count, 50);
    }

    #[tokio::test]
    async fn test_activate_resets_previous_day() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();
        seed_session(&f, "6281", 50, 50, 1).await;

        let activation = f
            .governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap();
        assert_eq!(activation.session.usage_count, 0);
        assert_eq!(activation.session.last_reset_date, f.clock.today());
    }

    #[tokio::test]
    async fn test_activate_refreshes_tier_limit() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();
        f.governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap();

        let mut user = f.store.find_user("6281").await.unwrap().unwrap();
        user.is_premium = true;
        f.store.update_user(&user).await.unwrap();

        let activation = f
            .governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap();
        assert_eq!(activation.session.daily_limit, 200);
    }

    #[tokio::test]
    async fn test_owner_always_unlimited() {
        let f = fixture();
        f.governor.register("owner").await.unwrap();
        seed_session(&f, "owner", 50, 50, 0).await;

        let activation = f
            .governor
            .activate("owner", ActivateOptions::default())
            .await
            .unwrap();
        assert_eq!(activation.session.daily_limit, UNLIMITED_DAILY_LIMIT);
        assert!(activation.session.is_unlimited);

        assert!(f.governor.is_active("owner").await.unwrap().is_active());
    }

    #[tokio::test]
    async fn test_deactivate() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();

        let err = f.governor.deactivate("6281").await.unwrap_err();
        assert!(matches!(err, GovernorError::NotActive(_)));

        f.governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap();
        let session = f.governor.deactivate("6281").await.unwrap();
        assert!(!session.is_active);
        assert!(session.session_expiry.is_none());

        let status = f.governor.is_active("6281").await.unwrap();
        assert_eq!(status.reason(), Some(InactiveReason::NotActivated));
    }

    #[tokio::test]
    async fn test_lazy_expiry_flips_and_persists() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();
        f.governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap();

        f.clock.advance(Duration::minutes(61));
        // Nothing has touched the record yet
        let stale = f.store.find_user_session("6281").await.unwrap().unwrap();
        assert!(stale.is_active);

        let status = f.governor.is_active("6281").await.unwrap();
        assert_eq!(status.reason(), Some(InactiveReason::Expired));

        let stored = f.store.find_user_session("6281").await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(stored.session_expiry.is_none());
    }

    #[tokio::test]
    async fn test_expiry_in_past_reports_immediately() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();
        seed_session(&f, "6281", 0, 50, 0).await;
        let mut session = f.store.find_user_session("6281").await.unwrap().unwrap();
        session.is_active = true;
        session.session_expiry = Some(f.clock.now() - Duration::milliseconds(1));
        f.store.update_user_session(&session).await.unwrap();

        let status = f.governor.is_active("6281").await.unwrap();
        assert_eq!(status.reason(), Some(InactiveReason::Expired));
    }

    #[tokio::test]
    async fn test_is_active_limit_reached_keeps_flag() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();
        f.governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap();
        seed_session(&f, "6281", 50, 50, 0).await;

        let status = f.governor.is_active("6281").await.unwrap();
        assert_eq!(status.reason(), Some(InactiveReason::LimitReached));

        let stored = f.store.find_user_session("6281").await.unwrap().unwrap();
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn test_is_active_follows_owner_change() {
        // 6281 was the owner under an earlier configuration
        let before = fixture_with(GovernorConfig::default().with_owner("6281"));
        before.governor.register("6281").await.unwrap();
        before
            .governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap();
        seed_session(&before, "6281", 60, UNLIMITED_DAILY_LIMIT, 0).await;

        let governor = SessionGovernor::with_clock(
            Arc::new(before.store.clone()),
            GovernorConfig::default().with_owner("owner"),
            Arc::new(before.clock.clone()),
        );
        let status = governor.is_active("6281").await.unwrap();
        assert_eq!(status.reason(), Some(InactiveReason::LimitReached));

        let stored = before.store.find_user_session("6281").await.unwrap().unwrap();
        assert!(!stored.is_unlimited);
        assert_eq!(stored.daily_limit, 50);
    }

    #[tokio::test]
    async fn test_is_active_resets_yesterday_usage() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();
        f.governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap();
        seed_session(&f, "6281", 50, 50, 1).await;

        let status = f.governor.is_active("6281").await.unwrap();
        let session = status.session().expect("should be active after reset");
        assert_eq!(session.usage_count, 0);

        let stored = f.store.find_user_session("6281").await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 0);
        assert_eq!(stored.last_reset_date, f.clock.today());
    }

    #[tokio::test]
    async fn test_reset_happens_once_per_day() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();
        f.governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap();
        seed_session(&f, "6281", 50, 50, 1).await;

        assert!(f.governor.is_active("6281").await.unwrap().is_active());
        seed_session(&f, "6281", 50, 50, 0).await;
        let status = f.governor.is_active("6281").await.unwrap();
        assert_eq!(status.reason(), Some(InactiveReason::LimitReached));
    }

    #[tokio::test]
    async fn test_is_active_unregistered() {
        let f = fixture();
        let status = f.governor.is_active("ghost").await.unwrap();
        assert_eq!(status.reason(), Some(InactiveReason::NotRegistered));
    }

    #[tokio::test]
    async fn test_group_activation_does_not_create_user_session() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();

        let activation = f
            .governor
            .activate_for_group("group-1", "6281")
            .await
            .unwrap();
        assert!(activation.created);
        assert_eq!(activation.session.activator_identity.as_deref(), Some("6281"));
        assert_eq!(f.store.user_session_count().await, 0);

        assert!(f.governor.is_active_for_group("group-1").await.unwrap().is_active());
    }

    #[tokio::test]
    async fn test_group_activation_requires_registered_activator() {
        let f = fixture();
        let err = f
            .governor
            .activate_for_group("group-1", "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, GovernorError::NotRegistered(_)));
    }

    #[tokio::test]
    async fn test_group_active_ignores_activator_quota() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();
        seed_session(&f, "6281", 50, 50, 0).await;
        f.governor
            .activate_for_group("group-1", "6281")
            .await
            .unwrap();

        assert!(f.governor.is_active_for_group("group-1").await.unwrap().is_active());
    }

    #[tokio::test]
    async fn test_group_lazy_expiry() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();
        f.governor
            .activate_for_group("group-1", "6281")
            .await
            .unwrap();

        f.clock.advance(Duration::minutes(90));
        let status = f.governor.is_active_for_group("group-1").await.unwrap();
        assert_eq!(status.reason(), Some(InactiveReason::Expired));

        let stored = f.store.find_group_session("group-1").await.unwrap().unwrap();
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn test_group_deactivate() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();

        let err = f
            .governor
            .deactivate_for_group("group-1", "6281")
            .await
            .unwrap_err();
        assert!(matches!(err, GovernorError::NotActive(_)));

        f.governor
            .activate_for_group("group-1", "6281")
            .await
            .unwrap();
        let session = f
            .governor
            .deactivate_for_group("group-1", "6281")
            .await
            .unwrap();
        assert!(!session.is_active);
    }

    #[tokio::test]
    async fn test_upgrade_to_premium() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();

        let session = f.governor.upgrade_to_premium("6281", None).await.unwrap();
        assert_eq!(session.daily_limit, 200);
        assert!(!session.is_active);
        assert!(f.store.find_user("6281").await.unwrap().unwrap().is_premium);

        let session = f
            .governor
            .upgrade_to_premium("6281", Some(500))
            .await
            .unwrap();
        assert_eq!(session.daily_limit, 500);

        // Activation keeps the custom ceiling
        let activation = f
            .governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap();
        assert_eq!(activation.session.daily_limit, 500);
    }

    #[tokio::test]
    async fn test_upgrade_owner_gets_unlimited() {
        let f = fixture();
        f.governor.register("owner").await.unwrap();
        let session = f
            .governor
            .upgrade_to_premium("owner", Some(10))
            .await
            .unwrap();
        assert_eq!(session.daily_limit, UNLIMITED_DAILY_LIMIT);
    }

    #[tokio::test]
    async fn test_upgrade_group_upgrades_activator() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();
        f.governor
            .activate_for_group("group-1", "6281")
            .await
            .unwrap();

        f.governor.upgrade_group_to_premium("group-1").await.unwrap();
        let status = f.governor.status_for_group("group-1").await.unwrap();
        assert!(status.activator_premium);
        assert_eq!(status.activated_by.as_deref(), Some("6281"));
    }

    #[tokio::test]
    async fn test_status_for_user() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();

        let status = f.governor.status_for_user("6281").await.unwrap();
        assert_eq!(status.state, SessionState::NotConfigured);

        f.governor
            .activate("6281", ActivateOptions::default())
            .await
            .unwrap();
        let status = f.governor.status_for_user("6281").await.unwrap();
        assert_eq!(status.state, SessionState::Active);
        assert_eq!(status.remaining, Remaining::Limited(50));
        assert_eq!(status.session_minutes_left, Some(60));

        f.clock.advance(Duration::minutes(61));
        let status = f.governor.status_for_user("6281").await.unwrap();
        assert_eq!(status.state, SessionState::Expired);
        // Status is read-only
        let stored = f.store.find_user_session("6281").await.unwrap().unwrap();
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn test_register_twice() {
        let f = fixture();
        f.governor.register("6281").await.unwrap();
        let err = f.governor.register("6281").await.unwrap_err();
        assert!(matches!(err, GovernorError::AlreadyRegistered(_)));

        let user = f.governor.register_if_absent("6281").await.unwrap();
        assert_eq!(user.identity, "6281");
    }

    #[tokio::test]
    async fn test_is_admin() {
        let f = fixture_with(GovernorConfig {
            admins: vec!["admin".to_string()],
            ..GovernorConfig::default().with_owner("owner")
        });
        assert!(f.governor.is_admin("owner").await.unwrap());
        assert!(f.governor.is_admin("admin").await.unwrap());
        assert!(!f.governor.is_admin("6281").await.unwrap());

        let user = f.governor.register("admin").await.unwrap();
        assert!(user.is_admin);
    }
}
