//! Quota Store
//!
//! Persistence seam for user, user-session and group-session records.
//! Implementations must make each call atomic for a single record; the
//! governor never assumes cross-record transactions.

pub mod file;
pub mod memory;
pub mod records;

use async_trait::async_trait;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use records::{GroupSession, Remaining, UserRecord, UserSession, UNLIMITED_DAILY_LIMIT};

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record under that key
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Create called for an existing key
    #[error("Record already exists: {0}")]
    Conflict(String),

    /// Backend could not be reached or written
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Snapshot could not be encoded or decoded
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Record CRUD keyed by identity or group key
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn find_user(&self, identity: &str) -> StoreResult<Option<UserRecord>>;

    async fn create_user(&self, user: UserRecord) -> StoreResult<UserRecord>;

    async fn update_user(&self, user: &UserRecord) -> StoreResult<()>;

    async fn find_user_session(&self, identity: &str) -> StoreResult<Option<UserSession>>;

    async fn create_user_session(&self, session: UserSession) -> StoreResult<UserSession>;

    async fn update_user_session(&self, session: &UserSession) -> StoreResult<()>;

    /// Atomically add one to `usage_count` and return the updated record
    async fn increment_usage(&self, identity: &str) -> StoreResult<UserSession>;

    async fn find_group_session(&self, group_key: &str) -> StoreResult<Option<GroupSession>>;

    async fn create_group_session(&self, session: GroupSession) -> StoreResult<GroupSession>;

    async fn update_group_session(&self, session: &GroupSession) -> StoreResult<()>;
}
