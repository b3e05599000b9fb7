//! In-memory quota store

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::records::{GroupSession, UserRecord, UserSession};
use super::{QuotaStore, StoreError, StoreResult};

/// All records, keyed by identity / group key. Also the on-disk snapshot format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub users: HashMap<String, UserRecord>,
    #[serde(default)]
    pub user_sessions: HashMap<String, UserSession>,
    #[serde(default)]
    pub group_sessions: HashMap<String, GroupSession>,
}

impl StoreState {
    pub(crate) fn create_user(&mut self, user: UserRecord) -> StoreResult<UserRecord> {
        if self.users.contains_key(&user.identity) {
            return Err(StoreError::Conflict(user.identity));
        }
        self.users.insert(user.identity.clone(), user.clone());
        Ok(user)
    }

    pub(crate) fn update_user(&mut self, user: &UserRecord) -> StoreResult<()> {
        match self.users.get_mut(&user.identity) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(user.identity.clone())),
        }
    }

    pub(crate) fn create_user_session(&mut self, session: UserSession) -> StoreResult<UserSession> {
        if self.user_sessions.contains_key(&session.identity) {
            return Err(StoreError::Conflict(session.identity));
        }
        self.user_sessions
            .insert(session.identity.clone(), session.clone());
        Ok(session)
    }

    pub(crate) fn update_user_session(&mut self, session: &UserSession) -> StoreResult<()> {
        match self.user_sessions.get_mut(&session.identity) {
            Some(existing) => {
                *existing = session.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(StoreError::NotFound(session.identity.clone())),
        }
    }

    pub(crate) fn increment_usage(&mut self, identity: &str) -> StoreResult<UserSession> {
        let session = self
            .user_sessions
            .get_mut(identity)
            .ok_or_else(|| StoreError::NotFound(identity.to_string()))?;
        session.usage_count = session.usage_count.saturating_add(1);
        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    pub(crate) fn create_group_session(&mut self, session: GroupSession) -> StoreResult<GroupSession> {
        if self.group_sessions.contains_key(&session.group_key) {
            return Err(StoreError::Conflict(session.group_key));
        }
        self.group_sessions
            .insert(session.group_key.clone(), session.clone());
        Ok(session)
    }

    pub(crate) fn update_group_session(&mut self, session: &GroupSession) -> StoreResult<()> {
        match self.group_sessions.get_mut(&session.group_key) {
            Some(existing) => {
                *existing = session.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(StoreError::NotFound(session.group_key.clone())),
        }
    }
}

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record (for diagnostics and tests)
    pub async fn snapshot(&self) -> StoreState {
        self.state.read().await.clone()
    }

    pub async fn user_session_count(&self) -> usize {
        self.state.read().await.user_sessions.len()
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn find_user(&self, identity: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.state.read().await.users.get(identity).cloned())
    }

    async fn create_user(&self, user: UserRecord) -> StoreResult<UserRecord> {
        self.state.write().await.create_user(user)
    }

    async fn update_user(&self, user: &UserRecord) -> StoreResult<()> {
        self.state.write().await.update_user(user)
    }

    async fn find_user_session(&self, identity: &str) -> StoreResult<Option<UserSession>> {
        Ok(self.state.read().await.user_sessions.get(identity).cloned())
    }

    async fn create_user_session(&self, session: UserSession) -> StoreResult<UserSession> {
        self.state.write().await.create_user_session(session)
    }

    async fn update_user_session(&self, session: &UserSession) -> StoreResult<()> {
        self.state.write().await.update_user_session(session)
    }

    async fn increment_usage(&self, identity: &str) -> StoreResult<UserSession> {
        self.state.write().await.increment_usage(identity)
    }

    async fn find_group_session(&self, group_key: &str) -> StoreResult<Option<GroupSession>> {
        Ok(self.state.read().await.group_sessions.get(group_key).cloned())
    }

    async fn create_group_session(&self, session: GroupSession) -> StoreResult<GroupSession> {
        self.state.write().await.create_group_session(session)
    }

    async fn update_group_session(&self, session: &GroupSession) -> StoreResult<()> {
        self.state.write().await.update_group_session(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 22).unwrap()
    }

    #[tokio::test]
    async fn test_user_create_and_find() {
        let store = MemoryStore::new();
        store.create_user(UserRecord::new("6281")).await.unwrap();

        let found = store.find_user("6281").await.unwrap();
        assert!(found.is_some());
        assert!(store.find_user("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let store = MemoryStore::new();
        store.create_user(UserRecord::new("6281")).await.unwrap();

        let err = store.create_user(UserRecord::new("6281")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = MemoryStore::new();
        let session = UserSession::new("ghost", 50, false, today());

        let err = store.update_user_session(&session).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_increment_usage() {
        let store = MemoryStore::new();
        store
            .create_user_session(UserSession::new("6281", 50, false, today()))
            .await
            .unwrap();

        store.increment_usage("6281").await.unwrap();
        let updated = store.increment_usage("6281").await.unwrap();
        assert_eq!(updated.usage_count, 2);

        let reloaded = store.find_user_session("6281").await.unwrap().unwrap();
        assert_eq!(reloaded.usage_count, 2);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let store = MemoryStore::new();
        store
            .create_user_session(UserSession::new("6281", 500, false, today()))
            .await
            .unwrap();

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment_usage("6281").await })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        let session = store.find_user_session("6281").await.unwrap().unwrap();
        assert_eq!(session.usage_count, 50);
    }

    #[tokio::test]
    async fn test_group_sessions() {
        let store = MemoryStore::new();
        let mut group = GroupSession::new("group-1@g.us");
        store.create_group_session(group.clone()).await.unwrap();

        group.is_active = true;
        group.activator_identity = Some("6281".to_string());
        store.update_group_session(&group).await.unwrap();

        let found = store.find_group_session("group-1@g.us").await.unwrap().unwrap();
        assert!(found.is_active);
        assert_eq!(found.activator_identity.as_deref(), Some("6281"));
    }
}
