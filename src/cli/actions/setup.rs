//! Wiring shared by the server and the regenerate action.

use crate::{
    cli::globals::GlobalArgs,
    clock::{Clock, SystemClock},
    config::{EncryptionMode, Settings},
    keys::{
        rotation::bootstrap_secret, KeyLifecycleService, KeyStore, MasterKeyRotationWatcher,
        StateStore,
    },
    notify::{LogNotifier, Notifier},
    store::postgres::{apply_schema, PgKeyStore, PgStateStore},
    vault::{CryptoVault, MasterSecretSource},
};
use anyhow::{bail, Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Options {
    pub dsn: String,
    /// JSON settings file; defaults apply when absent.
    pub config: Option<PathBuf>,
}

/// # Errors
/// Returns an error if the file is invalid or `env` mode has no external secret.
pub fn load_settings(config: Option<&Path>, globals: &GlobalArgs) -> Result<Settings> {
    let settings = match config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    if settings.encryption_mode == EncryptionMode::Env && globals.encryption_key.is_none() {
        bail!("encryption mode `env` requires --encryption-key or SENTINEL_ENCRYPTION_KEY");
    }

    debug!(
        mode = settings.encryption_mode.as_str(),
        header = settings.custom_auth_header.as_str(),
        "Settings loaded"
    );
    Ok(settings)
}

/// # Errors
/// Returns an error if the database is unreachable or the schema cannot be applied.
pub async fn connect(dsn: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    apply_schema(&pool)
        .await
        .context("Failed to apply database schema")?;

    Ok(pool)
}

/// Postgres-backed collaborators plus the lifecycle service built on them.
pub struct Components {
    pub pool: PgPool,
    pub settings: Settings,
    pub clock: Arc<dyn Clock>,
    pub keys: Arc<dyn KeyStore>,
    pub state: Arc<dyn StateStore>,
    pub notifier: Arc<dyn Notifier>,
    pub service: Arc<KeyLifecycleService>,
}

impl Components {
    /// # Errors
    /// Returns an error if settings, database or secret bootstrap fail.
    pub async fn build(options: &Options, globals: &GlobalArgs) -> Result<Self> {
        let settings = load_settings(options.config.as_deref(), globals)?;
        let pool = connect(&options.dsn).await?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let keys: Arc<dyn KeyStore> = Arc::new(PgKeyStore::new(pool.clone()));
        let state: Arc<dyn StateStore> = Arc::new(PgStateStore::new(pool.clone()));
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

        let source = MasterSecretSource::from_settings(&settings, globals.encryption_key.clone());
        let source = bootstrap_secret(state.as_ref(), source)
            .await
            .context("Failed to bootstrap the master secret")?;
        if source.resolve().is_err() {
            info!("No master secret resolved; key generation is unavailable");
        }

        let service = Arc::new(KeyLifecycleService::new(
            keys.clone(),
            Arc::new(CryptoVault::new(source)),
            notifier.clone(),
            clock.clone(),
        ));

        Ok(Self {
            pool,
            settings,
            clock,
            keys,
            state,
            notifier,
            service,
        })
    }

    #[must_use]
    pub fn watcher(&self) -> MasterKeyRotationWatcher {
        MasterKeyRotationWatcher::new(self.service.clone(), self.state.clone())
    }
}
