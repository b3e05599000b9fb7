//! JSON file backed quota store
//!
//! Keeps every record in memory and rewrites the snapshot file after each
//! mutation (temp file + rename). Writes hold the state lock until the file is
//! on disk, so snapshots are never interleaved.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::memory::StoreState;
use super::records::{GroupSession, UserRecord, UserSession};
use super::{QuotaStore, StoreResult};

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    state: Arc<RwLock<StoreState>>,
}

impl FileStore {
    /// Open the snapshot at `path`, starting empty if it does not exist
    pub async fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            let state: StoreState = serde_json::from_str(&content)?;
            info!(
                "Loaded store from {:?} ({} users, {} sessions, {} groups)",
                path,
                state.users.len(),
                state.user_sessions.len(),
                state.group_sessions.len()
            );
            state
        } else {
            debug!("Store file not found at {:?}, starting empty", path);
            StoreState::default()
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &StoreState) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Apply a mutation and write the snapshot before releasing the lock
    async fn mutate<T>(
        &self,
        op: impl FnOnce(&mut StoreState) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let out = op(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(out)
    }
}

#[async_trait]
impl QuotaStore for FileStore {
    async fn find_user(&self, identity: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.state.read().await.users.get(identity).cloned())
    }

    async fn create_user(&self, user: UserRecord) -> StoreResult<UserRecord> {
        self.mutate(|s| s.create_user(user)).await
    }

    async fn update_user(&self, user: &UserRecord) -> StoreResult<()> {
        self.mutate(|s| s.update_user(user)).await
    }

    async fn find_user_session(&self, identity: &str) -> StoreResult<Option<UserSession>> {
        Ok(self.state.read().await.user_sessions.get(identity).cloned())
    }

    async fn create_user_session(&self, session: UserSession) -> StoreResult<UserSession> {
        self.mutate(|s| s.create_user_session(session)).await
    }

    async fn update_user_session(&self, session: &UserSession) -> StoreResult<()> {
        self.mutate(|s| s.update_user_session(session)).await
    }

    async fn increment_usage(&self, identity: &str) -> StoreResult<UserSession> {
        self.mutate(|s| s.increment_usage(identity)).await
    }

    async fn find_group_session(&self, group_key: &str) -> StoreResult<Option<GroupSession>> {
        Ok(self.state.read().await.group_sessions.get(group_key).cloned())
    }

    async fn create_group_session(&self, session: GroupSession) -> StoreResult<GroupSession> {
        self.mutate(|s| s.create_group_session(session)).await
    }

    async fn update_group_session(&self, session: &GroupSession) -> StoreResult<()> {
        self.mutate(|s| s.update_group_session(session)).await
    }
}
