//! In-process collaborators used by tests and local runs.

use crate::{
    keys::{models::ApiKeyRecord, rotation::StateStore, store::KeyStore},
    principal::{Principal, PrincipalDirectory},
    Error, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use uuid::Uuid;

fn poisoned() -> Error {
    Error::Storage("Poisoned lock".to_string())
}

#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    records: RwLock<HashMap<Uuid, ApiKeyRecord>>,
}

impl MemoryKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Uuid, ApiKeyRecord>>> {
        self.records.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Uuid, ApiKeyRecord>>> {
        self.records.write().map_err(|_| poisoned())
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn find_by_hash(&self, hashed_key: &str) -> Result<Option<ApiKeyRecord>> {
        Ok(self
            .read()?
            .values()
            .find(|record| record.hashed_key == hashed_key)
            .cloned())
    }

    async fn find_by_owner(&self, owner_id: Uuid) -> Result<Option<ApiKeyRecord>> {
        Ok(self
            .read()?
            .values()
            .find(|record| record.owner_id == owner_id)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApiKeyRecord>> {
        Ok(self.read()?.get(&id).cloned())
    }

    async fn save(&self, record: &ApiKeyRecord) -> Result<()> {
        let mut records = self.write()?;
        if records
            .values()
            .any(|other| other.owner_id == record.owner_id && other.id != record.id)
        {
            return Err(Error::OwnerConflict(record.owner_id));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn delete(&self, record: &ApiKeyRecord) -> Result<()> {
        self.write()?.remove(&record.id);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ApiKeyRecord>> {
        let mut records: Vec<_> = self.read()?.values().cloned().collect();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }

    async fn set_blocked(&self, id: Uuid, blocked: bool, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .write()?
            .get_mut(&id)
            .map(|record| {
                record.blocked = blocked;
                record.updated_at = at;
            })
            .is_some())
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .write()?
            .get_mut(&id)
            .map(|record| {
                record.enabled = enabled;
                record.updated_at = at;
            })
            .is_some())
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut records = self.write()?;
        let before = records.len();
        records.retain(|_, record| !record.expires_at.is_some_and(|at| at < cutoff));
        Ok(before - records.len())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDirectory {
    principals: RwLock<HashMap<Uuid, Principal>>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a principal.
    ///
    /// # Errors
    /// Returns `Error::Storage` if the lock is poisoned.
    pub fn insert(&self, principal: Principal) -> Result<()> {
        self.principals
            .write()
            .map_err(|_| poisoned())?
            .insert(principal.id, principal);
        Ok(())
    }
}

#[async_trait]
impl PrincipalDirectory for MemoryDirectory {
    async fn load(&self, owner_id: Uuid) -> Result<Option<Principal>> {
        Ok(self
            .principals
            .read()
            .map_err(|_| poisoned())?
            .get(&owner_id)
            .cloned())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .read()
            .map_err(|_| poisoned())?
            .get(name)
            .cloned())
    }

    async fn set(&self, name: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .map_err(|_| poisoned())?
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}
