//! TTL-bound key/value cache used for throttling windows.

use crate::{clock::Clock, Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::debug;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomically add one to the counter at `key` and return the new value.
    ///
    /// A missing or expired counter starts at 1 and lives for `ttl`; later
    /// increments keep the original expiry.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64>;

    /// Atomically drop events older than `window` from the timestamp list at
    /// `key`, then append one at the current time unless `cap` events remain.
    ///
    /// The list lives for `window` after the last write.
    async fn record_event(
        &self,
        key: &str,
        window: Duration,
        cap: Option<usize>,
    ) -> Result<WindowCount>;
}

/// Outcome of [`Cache::record_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Events inside the window after the call, including the appended one.
    pub count: usize,
    /// False when `cap` refused the event.
    pub recorded: bool,
}

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// Process-local cache. A single mutex serializes every operation, which makes
/// `increment` atomic across concurrent requests.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Cache("Poisoned lock".to_string()))
    }

    /// Drop every expired entry, returning how many were removed.
    ///
    /// # Errors
    /// Returns `Error::Cache` if the lock is poisoned.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "Evicted expired cache entries");
        }
        Ok(removed)
    }

    /// Entries currently held, expired or not.
    ///
    /// # Errors
    /// Returns `Error::Cache` if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// # Errors
    /// Returns `Error::Cache` if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let expires_at = self.clock.now() + ttl;
        self.lock()?
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64> {
        let now = self.clock.now();
        let mut entries = self.lock()?;

        let live = entries.get(key).filter(|entry| entry.expires_at > now);
        let (count, expires_at) = match live {
            Some(entry) => {
                let current = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .ok_or_else(|| Error::Cache(format!("{key} does not hold a counter")))?;
                (current.saturating_add(1), entry.expires_at)
            }
            None => (1, now + ttl),
        };

        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(count)
    }

    async fn record_event(
        &self,
        key: &str,
        window: Duration,
        cap: Option<usize>,
    ) -> Result<WindowCount> {
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();
        let window_ms = window.num_milliseconds();
        let mut entries = self.lock()?;

        let live = entries.get(key).filter(|entry| entry.expires_at > now);
        let mut events: Vec<i64> = match live {
            Some(entry) => serde_json::from_slice(&entry.value)
                .map_err(|err| Error::Cache(format!("{key} does not hold a window: {err}")))?,
            None => Vec::new(),
        };
        events.retain(|ts| now_ms - ts < window_ms);

        let recorded = !cap.is_some_and(|cap| events.len() >= cap);
        if recorded {
            events.push(now_ms);
        }

        let value = serde_json::to_vec(&events).map_err(|err| Error::Cache(err.to_string()))?;
        let count = events.len();
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + window,
            },
        );
        Ok(WindowCount { count, recorded })
    }
}
