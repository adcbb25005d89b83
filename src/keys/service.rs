use super::{
    models::{ApiKeyRecord, IssuedKey},
    store::KeyStore,
};
use crate::{
    clock::Clock,
    notify::{self, NotificationKind, Notifier},
    vault::CryptoVault,
    Error, Result,
};
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Issues, rotates and revokes keys. Owns every write of key material.
pub struct KeyLifecycleService {
    keys: Arc<dyn KeyStore>,
    vault: Arc<CryptoVault>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl KeyLifecycleService {
    #[must_use]
    pub fn new(
        keys: Arc<dyn KeyStore>,
        vault: Arc<CryptoVault>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            keys,
            vault,
            notifier,
            clock,
        }
    }

    #[must_use]
    pub fn vault(&self) -> &CryptoVault {
        &self.vault
    }

    /// Produce a new raw key with its hash and payload. Both derived values are
    /// returned together so a record never carries one without the other.
    fn derive_material(&self) -> Result<(SecretString, String, String)> {
        let raw = CryptoVault::generate_raw_key();
        let hashed_key = CryptoVault::hash(raw.expose_secret());
        let payload = self
            .vault
            .encrypt(raw.expose_secret())
            .map_err(|err| match err {
                Error::NoSecretConfigured => Error::CryptoUnavailable,
                other => other,
            })?;
        Ok((raw, hashed_key, payload))
    }

    /// Issue a key for `owner_id`, replacing any key the owner already holds.
    ///
    /// # Errors
    /// Returns `Error::CryptoUnavailable` without a master secret, or the store's error.
    #[instrument(skip(self))]
    pub async fn generate(
        &self,
        owner_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<IssuedKey> {
        let (raw_key, hashed_key, encrypted_payload) = self.derive_material()?;
        let now = self.clock.now();

        let record = match self.keys.find_by_owner(owner_id).await? {
            Some(existing) => ApiKeyRecord {
                hashed_key,
                encrypted_payload,
                enabled: true,
                blocked: false,
                expires_at,
                updated_at: now,
                ..existing
            },
            None => ApiKeyRecord {
                id: Uuid::now_v7(),
                owner_id,
                label: CryptoVault::generate_label(),
                hashed_key,
                encrypted_payload,
                enabled: true,
                blocked: false,
                expires_at,
                created_at: now,
                updated_at: now,
            },
        };
        self.keys.save(&record).await?;

        info!(key_id = %record.id, %owner_id, "API key issued");
        notify::dispatch(
            self.notifier.as_ref(),
            NotificationKind::NewKey,
            owner_id,
            json!({
                "key_id": record.id,
                "label": record.label,
                "expires_at": record.expires_at,
            }),
        );

        Ok(IssuedKey { record, raw_key })
    }

    /// Delete the owner's key. Returns false when there was nothing to revoke.
    ///
    /// # Errors
    /// Returns the store's error.
    #[instrument(skip(self))]
    pub async fn revoke(&self, owner_id: Uuid) -> Result<bool> {
        let Some(record) = self.keys.find_by_owner(owner_id).await? else {
            return Ok(false);
        };
        self.keys.delete(&record).await?;

        info!(key_id = %record.id, %owner_id, "API key revoked");
        notify::dispatch(
            self.notifier.as_ref(),
            NotificationKind::Revoked,
            owner_id,
            json!({"key_id": record.id, "label": record.label}),
        );
        Ok(true)
    }

    /// Revoke then issue, carrying the current expiry over. A failure between the
    /// two steps leaves the owner without a key until the next `generate`.
    ///
    /// # Errors
    /// Returns the first error of either step.
    #[instrument(skip(self))]
    pub async fn rotate(&self, owner_id: Uuid) -> Result<IssuedKey> {
        let expires_at = self
            .keys
            .find_by_owner(owner_id)
            .await?
            .and_then(|record| record.expires_at);
        self.revoke(owner_id).await?;
        self.generate(owner_id, expires_at).await
    }

    /// Replace the material of every record, keeping owner, label, status and expiry.
    /// Not transactional: records already processed before an error stay regenerated.
    ///
    /// # Errors
    /// Returns `Error::CryptoUnavailable` without a master secret, or the store's error.
    #[instrument(skip(self))]
    pub async fn force_regenerate_all(&self) -> Result<usize> {
        let records = self.keys.all().await?;
        let mut regenerated = 0;
        for record in records {
            let (_raw, hashed_key, encrypted_payload) = self.derive_material()?;
            let updated = ApiKeyRecord {
                hashed_key,
                encrypted_payload,
                updated_at: self.clock.now(),
                ..record
            };
            self.keys.save(&updated).await?;
            regenerated += 1;
        }
        info!(regenerated, "Regenerated all API keys");
        Ok(regenerated)
    }

    /// Flip `blocked`. Returns false when the key does not exist.
    ///
    /// # Errors
    /// Returns the store's error.
    #[instrument(skip(self))]
    pub async fn toggle_block(&self, key_id: Uuid) -> Result<bool> {
        let Some(record) = self.keys.find_by_id(key_id).await? else {
            return Ok(false);
        };
        let blocked = !record.blocked;
        if !self.keys.set_blocked(key_id, blocked, self.clock.now()).await? {
            return Ok(false);
        }

        let kind = if blocked {
            warn!(%key_id, owner_id = %record.owner_id, "API key blocked by administrator");
            NotificationKind::Blocked
        } else {
            info!(%key_id, owner_id = %record.owner_id, "API key unblocked");
            NotificationKind::Unblocked
        };
        notify::dispatch(
            self.notifier.as_ref(),
            kind,
            record.owner_id,
            json!({"key_id": record.id, "label": record.label}),
        );
        Ok(true)
    }

    /// Whether the key is blocked.
    ///
    /// # Errors
    /// Returns `Error::NotFound` for unknown keys.
    pub async fn status_of(&self, key_id: Uuid) -> Result<bool> {
        self.keys
            .find_by_id(key_id)
            .await?
            .map(|record| record.blocked)
            .ok_or(Error::NotFound)
    }

    /// # Errors
    /// Returns `Error::NotFound` for unknown keys.
    #[instrument(skip(self))]
    pub async fn set_enabled(&self, key_id: Uuid, enabled: bool) -> Result<ApiKeyRecord> {
        if !self.keys.set_enabled(key_id, enabled, self.clock.now()).await? {
            return Err(Error::NotFound);
        }
        info!(%key_id, enabled, "API key status changed");
        self.keys.find_by_id(key_id).await?.ok_or(Error::NotFound)
    }

    /// Decrypt the owner's raw key for display.
    ///
    /// # Errors
    /// Returns `Error::NotFound` without a key, `Error::CryptoUnavailable` without a
    /// master secret and `Error::DecryptionFailed` if the payload does not decrypt.
    pub async fn reveal(&self, owner_id: Uuid) -> Result<SecretString> {
        let record = self
            .keys
            .find_by_owner(owner_id)
            .await?
            .ok_or(Error::NotFound)?;
        self.vault
            .decrypt(&record.encrypted_payload)
            .map_err(|err| match err {
                Error::NoSecretConfigured => Error::CryptoUnavailable,
                other => other,
            })
    }

    /// # Errors
    /// Returns the store's error.
    pub async fn key_for(&self, owner_id: Uuid) -> Result<Option<ApiKeyRecord>> {
        self.keys.find_by_owner(owner_id).await
    }

    /// # Errors
    /// Returns the store's error.
    pub async fn has_key(&self, owner_id: Uuid) -> Result<bool> {
        Ok(self.keys.find_by_owner(owner_id).await?.is_some())
    }

    /// Delete keys that expired more than `retention` ago.
    ///
    /// # Errors
    /// Returns the store's error.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self, retention: Duration) -> Result<usize> {
        let purged = self
            .keys
            .delete_expired_before(self.clock.now() - retention)
            .await?;
        if purged > 0 {
            info!(purged, "Deleted long-expired API keys");
        }
        Ok(purged)
    }
}
