use super::models::ApiKeyRecord;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistence for key records.
///
/// `save` inserts or updates by `id` and must fail with `Error::OwnerConflict`
/// when a different record already belongs to the same owner. The flag setters
/// touch only their column and `updated_at`, never key material.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn find_by_hash(&self, hashed_key: &str) -> Result<Option<ApiKeyRecord>>;

    async fn find_by_owner(&self, owner_id: Uuid) -> Result<Option<ApiKeyRecord>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApiKeyRecord>>;

    async fn save(&self, record: &ApiKeyRecord) -> Result<()>;

    async fn delete(&self, record: &ApiKeyRecord) -> Result<()>;

    async fn all(&self) -> Result<Vec<ApiKeyRecord>>;

    /// Returns false when no record has this id.
    async fn set_blocked(&self, id: Uuid, blocked: bool, at: DateTime<Utc>) -> Result<bool>;

    /// Returns false when no record has this id.
    async fn set_enabled(&self, id: Uuid, enabled: bool, at: DateTime<Utc>) -> Result<bool>;

    /// Delete records whose `expires_at` is before `cutoff`, returning how many went.
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
