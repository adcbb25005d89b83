//! In-memory wiring shared by the integration suites.
#![allow(dead_code)]

use anyhow::{anyhow, Context, Result};
use chrono::{TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use sentinel::{
    auth::{ApiKeyRequest, AuthenticationPipeline},
    cache::MemoryCache,
    clock::ManualClock,
    config::{EncryptionMode, Settings},
    keys::KeyLifecycleService,
    notify::{Notification, NotificationKind, Notifier},
    principal::Principal,
    rate_limit::RateLimitCounter,
    store::memory::{MemoryDirectory, MemoryKeyStore, MemoryStateStore},
    vault::{CryptoVault, MasterSecretSource},
};
use std::{net::IpAddr, sync::Arc, sync::Mutex};
use uuid::Uuid;

pub const SECRET: &str = "integration-master-secret";

#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<Notification>>,
}

impl Outbox {
    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.sent
            .lock()
            .map(|sent| sent.iter().map(|n| n.kind).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

impl Notifier for Outbox {
    fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow!("Poisoned lock"))?
            .push(notification.clone());
        Ok(())
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub keys: Arc<MemoryKeyStore>,
    pub directory: Arc<MemoryDirectory>,
    pub state: Arc<MemoryStateStore>,
    pub cache: Arc<MemoryCache>,
    pub outbox: Arc<Outbox>,
    pub service: Arc<KeyLifecycleService>,
    pub pipeline: Arc<AuthenticationPipeline>,
}

impl Harness {
    pub fn new(settings: &Settings) -> Result<Self> {
        Self::with_secret(settings, SECRET)
    }

    pub fn with_secret(settings: &Settings, secret: &str) -> Result<Self> {
        let start = Utc
            .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .context("valid start time")?;
        let clock = Arc::new(ManualClock::new(start));
        let keys = Arc::new(MemoryKeyStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        let state = Arc::new(MemoryStateStore::new());
        let cache = Arc::new(MemoryCache::new(clock.clone()));
        let outbox = Arc::new(Outbox::default());

        let vault = CryptoVault::new(MasterSecretSource::new(
            Some(SecretString::from(secret.to_string())),
            None,
            EncryptionMode::Config,
        ));
        let service = Arc::new(KeyLifecycleService::new(
            keys.clone(),
            Arc::new(vault),
            outbox.clone(),
            clock.clone(),
        ));
        let counter = Arc::new(RateLimitCounter::new(
            cache.clone(),
            keys.clone(),
            clock.clone(),
        ));
        let pipeline = Arc::new(AuthenticationPipeline::new(
            settings,
            keys.clone(),
            directory.clone(),
            counter,
            outbox.clone(),
            clock.clone(),
        )?);

        Ok(Self {
            clock,
            keys,
            directory,
            state,
            cache,
            outbox,
            service,
            pipeline,
        })
    }

    /// Register an active principal and issue a key; returns the owner and raw key.
    pub async fn enroll(&self, name: &str) -> Result<(Uuid, String)> {
        let owner = Uuid::new_v4();
        self.directory.insert(Principal {
            id: owner,
            display_name: name.to_string(),
            active: true,
            roles: vec!["authenticated".to_string()],
        })?;
        let issued = self.service.generate(owner, None).await?;
        Ok((owner, issued.raw_key.expose_secret().to_string()))
    }
}

pub fn request_from(ip: [u8; 4], path: &str, key: &str) -> ApiKeyRequest {
    ApiKeyRequest::new(path)
        .with_client_ip(IpAddr::from(ip))
        .with_header("X-API-KEY", key)
}
