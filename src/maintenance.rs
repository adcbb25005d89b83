//! Background cleanup: expired cache entries and long-expired keys.

use crate::{cache::MemoryCache, keys::KeyLifecycleService, Result};
use chrono::Duration;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sweep {
    pub evicted: usize,
    pub purged: usize,
}

/// Run one cleanup pass.
///
/// # Errors
/// Returns the cache or key store error; the other half of the pass still runs.
pub async fn sweep(
    cache: &MemoryCache,
    service: &KeyLifecycleService,
    retention: Duration,
) -> Result<Sweep> {
    let evicted = cache.purge_expired();
    let purged = service.purge_expired(retention).await;
    let sweep = Sweep {
        evicted: evicted?,
        purged: purged?,
    };
    debug!(evicted = sweep.evicted, purged = sweep.purged, "Maintenance sweep");
    Ok(sweep)
}

/// Sweep on a fixed cadence until the task is aborted.
pub fn spawn_maintenance(
    cache: Arc<MemoryCache>,
    service: Arc<KeyLifecycleService>,
    retention: Duration,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(err) = sweep(&cache, &service, retention).await {
                error!("maintenance sweep failed: {err}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::Cache,
        clock::{Clock, ManualClock},
        config::EncryptionMode,
        keys::KeyStore,
        notify::LogNotifier,
        store::memory::MemoryKeyStore,
        vault::{CryptoVault, MasterSecretSource},
    };
    use chrono::{TimeZone, Utc};
    use secrecy::SecretString;
    use uuid::Uuid;

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn sweep_evicts_entries_and_old_keys() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        ));
        let keys = Arc::new(MemoryKeyStore::new());
        let cache = MemoryCache::new(clock.clone());
        let vault = CryptoVault::new(MasterSecretSource::new(
            Some(SecretString::from("maintenance")),
            None,
            EncryptionMode::Config,
        ));
        let service = KeyLifecycleService::new(
            keys.clone(),
            Arc::new(vault),
            Arc::new(LogNotifier),
            clock.clone(),
        );

        let stale = Uuid::new_v4();
        let recent = Uuid::new_v4();
        let forever = Uuid::new_v4();
        service
            .generate(stale, Some(clock.now() + Duration::hours(1)))
            .await
            .unwrap();
        service
            .generate(recent, Some(clock.now() + Duration::days(10)))
            .await
            .unwrap();
        service.generate(forever, None).await.unwrap();
        cache
            .set("short", b"1".to_vec(), Duration::minutes(5))
            .await
            .unwrap();

        clock.advance(Duration::days(3));
        let result = sweep(&cache, &service, Duration::days(1)).await.unwrap();

        assert_eq!(
            result,
            Sweep {
                evicted: 1,
                purged: 1
            }
        );
        assert!(keys.find_by_owner(stale).await.unwrap().is_none());
        assert!(keys.find_by_owner(recent).await.unwrap().is_some());
        assert!(keys.find_by_owner(forever).await.unwrap().is_some());
    }
}
