//! Per-key usage and failure windows.
//!
//! Both are pruned lists of timestamps over a trailing window, updated by the
//! cache in one atomic step so concurrent bursts are never under-counted.

use crate::{cache::Cache, clock::Clock, keys::store::KeyStore, Result};
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

#[must_use]
pub fn usage_key(key_id: Uuid) -> String {
    format!("sentinel_key:usage:{key_id}")
}

#[must_use]
pub fn failure_key(key_id: Uuid) -> String {
    format!("sentinel_key:failures:{key_id}")
}

fn rate_notice_key(key_id: Uuid) -> String {
    format!("sentinel_key:rate_notified:{key_id}")
}

pub struct RateLimitCounter {
    cache: Arc<dyn Cache>,
    keys: Arc<dyn KeyStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimitCounter {
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, keys: Arc<dyn KeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { cache, keys, clock }
    }

    /// Returns true when the key already used `limit` requests inside `window`.
    /// Admitted requests are appended; refused ones are not. `limit == 0` disables it.
    ///
    /// # Errors
    /// Returns `Error::Cache` if the window cannot be read or written.
    pub async fn record_and_check_usage(
        &self,
        key_id: Uuid,
        window: Duration,
        limit: u32,
    ) -> Result<bool> {
        if limit == 0 {
            return Ok(false);
        }

        let window_count = self
            .cache
            .record_event(&usage_key(key_id), window, Some(limit as usize))
            .await?;
        let exceeded = !window_count.recorded;

        debug!(%key_id, used = window_count.count, limit, exceeded, "Usage window updated");
        Ok(exceeded)
    }

    /// Count one failure in the trailing `window`. On reaching `limit` the key is marked
    /// blocked (if it was not already), the counter is cleared and true is returned.
    /// `limit == 0` disables it.
    ///
    /// # Errors
    /// Returns `Error::Cache` or `Error::Storage` if a collaborator fails.
    pub async fn record_failure_and_check_block(
        &self,
        key_id: Uuid,
        window: Duration,
        limit: u32,
    ) -> Result<bool> {
        if limit == 0 {
            return Ok(false);
        }

        let key = failure_key(key_id);
        let failures = self.cache.record_event(&key, window, None).await?.count;
        if failures < limit as usize {
            debug!(%key_id, failures, limit, "Failure recorded");
            return Ok(false);
        }

        let Some(record) = self.keys.find_by_id(key_id).await? else {
            self.cache.delete(&key).await?;
            return Ok(false);
        };

        // Only the flag is written; a concurrent regeneration keeps its material.
        if !record.blocked && self.keys.set_blocked(key_id, true, self.clock.now()).await? {
            warn!(%key_id, owner_id = %record.owner_id, failures, "API key blocked after repeated failures");
        }
        self.cache.delete(&key).await?;

        Ok(true)
    }

    /// Clearing an empty window is a no-op.
    ///
    /// # Errors
    /// Returns `Error::Cache` if the counter cannot be removed.
    pub async fn reset_failure_window(&self, key_id: Uuid) -> Result<()> {
        self.cache.delete(&failure_key(key_id)).await
    }

    /// True only for the first call within `window`, used to send one
    /// rate-limit notification per window.
    ///
    /// # Errors
    /// Returns `Error::Cache` if the marker cannot be incremented.
    pub async fn first_rate_limit_in_window(&self, key_id: Uuid, window: Duration) -> Result<bool> {
        Ok(self.cache.increment(&rate_notice_key(key_id), window).await? == 1)
    }
}
