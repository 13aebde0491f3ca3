//! Single-slot persistent cache of the last fetched catalog snapshot.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::kv::{self, KvStore};
use crate::catalog::{CatalogEntry, CatalogError, CatalogSnapshot};

/// How long a persisted snapshot stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
}

impl CachePolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// A snapshot is fresh iff `now - fetched_at < ttl`.
    pub fn is_fresh(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let age_ms = now.timestamp_millis() - fetched_at.timestamp_millis();
        i128::from(age_ms) < self.ttl.as_millis() as i128
    }
}

/// Names of the two storage slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    pub entries: String,
    pub timestamp: String,
}

impl Default for CacheKeys {
    fn default() -> Self {
        Self {
            entries: "xspace_apps_cache".to_owned(),
            timestamp: "xspace_cache_timestamp".to_owned(),
        }
    }
}

/// The persisted catalog snapshot.
///
/// Every storage failure degrades to "no cache": reads return `None`, writes
/// log and carry on. A broken disk never stops the in-memory catalog.
#[derive(Clone)]
pub struct CatalogCache {
    store: Arc<dyn KvStore>,
    keys: CacheKeys,
}

impl CatalogCache {
    pub fn new(store: Arc<dyn KvStore>, keys: CacheKeys) -> Self {
        Self { store, keys }
    }

    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    /// Fetch time of the stored snapshot, if both slots are present.
    pub async fn fetched_at(&self) -> Option<DateTime<Utc>> {
        let ts = self.stored_timestamp().await?;
        match self.store.contains(&self.keys.entries).await {
            Ok(true) => Some(ts),
            Ok(false) => None,
            Err(e) => {
                warn!(error = ?e, "Failed to check cached entries");
                None
            }
        }
    }

    async fn stored_timestamp(&self) -> Option<DateTime<Utc>> {
        match kv::get_timestamp(self.store.as_ref(), &self.keys.timestamp).await {
            Ok(ts) => ts,
            Err(e) => {
                warn!(error = ?e, "Failed to read cache timestamp");
                None
            }
        }
    }

    pub async fn is_valid(&self, policy: &CachePolicy) -> bool {
        self.is_valid_at(policy, Utc::now()).await
    }

    pub async fn is_valid_at(&self, policy: &CachePolicy, now: DateTime<Utc>) -> bool {
        self.fetched_at()
            .await
            .is_some_and(|fetched_at| policy.is_fresh(fetched_at, now))
    }

    /// The stored snapshot, regardless of age. Corrupt data reads as `None`.
    pub async fn read(&self) -> Option<CatalogSnapshot> {
        let fetched_at = self.stored_timestamp().await?;
        let raw = match self.store.get(&self.keys.entries).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = ?e, "Failed to read cached entries");
                return None;
            }
        };
        match serde_json::from_str::<Vec<CatalogEntry>>(&raw) {
            Ok(entries) => Some(CatalogSnapshot::new(entries, fetched_at)),
            Err(e) => {
                warn!(error = %e, "Cached catalog is corrupt, ignoring it");
                None
            }
        }
    }

    /// Replace the stored snapshot, logging instead of failing.
    pub async fn write(&self, snapshot: &CatalogSnapshot) {
        match self.try_write(snapshot).await {
            Ok(()) => debug!(entries = snapshot.len(), "Catalog cache written"),
            Err(e) => warn!(error = %e, "Failed to persist catalog cache, continuing in memory"),
        }
    }

    /// Replace the stored snapshot. The timestamp is written last so a failed
    /// write leaves the cache looking stale rather than fresh.
    pub async fn try_write(&self, snapshot: &CatalogSnapshot) -> Result<(), CatalogError> {
        let body =
            serde_json::to_string(&snapshot.entries).map_err(|e| CatalogError::Storage(e.into()))?;
        self.store
            .set(&self.keys.entries, &body)
            .await
            .map_err(CatalogError::Storage)?;
        kv::set_timestamp(self.store.as_ref(), &self.keys.timestamp, snapshot.fetched_at)
            .await
            .map_err(CatalogError::Storage)
    }

    /// Drop both slots.
    pub async fn clear(&self) -> Result<(), CatalogError> {
        self.store
            .remove(&self.keys.entries)
            .await
            .map_err(CatalogError::Storage)?;
        self.store
            .remove(&self.keys.timestamp)
            .await
            .map_err(CatalogError::Storage)?;
        Ok(())
    }
}
