//! Detects master secret (or encryption mode) changes and regenerates every key.

use super::service::KeyLifecycleService;
use crate::{
    vault::{
        secret::{fingerprint, generate_master_secret},
        MasterSecretSource,
    },
    Error, Result,
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const SECRET_HASH_STATE: &str = "encryption_key_hash";
pub const ENCRYPTION_MODE_STATE: &str = "encryption_mode";
pub const BOOTSTRAP_SECRET_STATE: &str = "encryption_key";

/// Small named values that must survive restarts.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<String>>;

    async fn set(&self, name: &str, value: &str) -> Result<()>;
}

/// In `config` mode with no secret anywhere, load the bootstrapped secret from
/// the state store, generating and persisting one on first use.
///
/// # Errors
/// Returns the state store's error.
pub async fn bootstrap_secret(
    state: &dyn StateStore,
    mut source: MasterSecretSource,
) -> Result<MasterSecretSource> {
    if !source.needs_bootstrap() {
        return Ok(source);
    }

    let secret = match state.get(BOOTSTRAP_SECRET_STATE).await? {
        Some(stored) if !stored.is_empty() => SecretString::from(stored),
        _ => {
            let generated = generate_master_secret();
            state
                .set(BOOTSTRAP_SECRET_STATE, generated.expose_secret())
                .await?;
            info!("Generated a master secret for config mode");
            generated
        }
    };
    source.configured = Some(secret);
    Ok(source)
}

pub struct MasterKeyRotationWatcher {
    service: Arc<KeyLifecycleService>,
    state: Arc<dyn StateStore>,
}

impl MasterKeyRotationWatcher {
    #[must_use]
    pub fn new(service: Arc<KeyLifecycleService>, state: Arc<dyn StateStore>) -> Self {
        Self { service, state }
    }

    /// Compare the active secret and mode with the stored ones and regenerate all
    /// keys on mismatch. Returns how many keys were regenerated, `None` when
    /// nothing changed. The new fingerprint is stored only after regeneration
    /// succeeds, so an interrupted run is retried on the next check.
    ///
    /// # Errors
    /// Returns the state store's or lifecycle service's error.
    #[instrument(skip(self))]
    pub async fn check(&self) -> Result<Option<usize>> {
        let source = self.service.vault().source();
        let secret = match source.resolve() {
            Ok(secret) => secret,
            Err(Error::NoSecretConfigured) => {
                warn!("No master secret available, skipping rotation check");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let current_hash = fingerprint(secret);
        let current_mode = source.mode.as_str();

        let stored_hash = self.state.get(SECRET_HASH_STATE).await?;
        let stored_mode = self.state.get(ENCRYPTION_MODE_STATE).await?;

        let secret_changed = stored_hash.as_deref() != Some(current_hash.as_str());
        let mode_changed = stored_mode.as_deref() != Some(current_mode);
        if !secret_changed && !mode_changed {
            return Ok(None);
        }

        info!(
            secret_changed,
            mode_changed,
            mode = current_mode,
            "Master secret changed, regenerating all API keys"
        );
        let regenerated = self.service.force_regenerate_all().await?;

        self.state.set(SECRET_HASH_STATE, &current_hash).await?;
        self.state.set(ENCRYPTION_MODE_STATE, current_mode).await?;

        Ok(Some(regenerated))
    }
}
