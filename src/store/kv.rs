//! String-keyed persistence for the catalog cache and session state.
//!
//! Slots are plain strings, mirroring browser local storage: the cache keeps
//! serialized entries in one slot and an epoch-millisecond timestamp in
//! another. Values may be lost at any time without breaking the caller.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Retrieve a value by key, or `None` if not present.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value. Readers see either the old or the new value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key, returning whether it existed.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Whether a value is stored under `key`, without loading it.
    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Retrieve a persisted timestamp, or `None` if absent or unparseable.
pub async fn get_timestamp(store: &dyn KvStore, key: &str) -> Result<Option<DateTime<Utc>>> {
    let value = store.get(key).await?;
    Ok(value.and_then(|v| {
        v.trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }))
}

/// Persist a timestamp as epoch milliseconds.
pub async fn set_timestamp(store: &dyn KvStore, key: &str, ts: DateTime<Utc>) -> Result<()> {
    store.set(key, &ts.timestamp_millis().to_string()).await
}

/// In-process store. Used for tests and sessions without usable disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.slots.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.slots.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.slots.remove(key).is_some())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.slots.contains_key(key))
    }
}

/// One file per key under a directory.
///
/// Writes land in a temporary sibling first and are renamed into place, so a
/// concurrent reader never observes a half-written value.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys map to file names with anything outside `[A-Za-z0-9._-]` replaced.
    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{name}.slot"))
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create {}", self.root.display()))?;

        let path = self.path_for(key);
        let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp.{}.{seq}", std::process::id()));

        tokio::fs::write(&tmp, value)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v1").await.unwrap();
        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
        assert!(store.remove("k").await.unwrap());
        assert!(!store.remove("k").await.unwrap());
    }

    #[tokio::test]
    async fn file_store_creates_directory_on_write() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path().join("nested/cache"));

        assert_eq!(store.get("apps").await.unwrap(), None);
        store.set("apps", "[]").await.unwrap();
        assert_eq!(store.get("apps").await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn file_store_leaves_no_temporaries() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        store.set("apps", "one").await.unwrap();
        store.set("apps", "two").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["apps.slot".to_string()]);
    }

    #[tokio::test]
    async fn contains_reflects_presence() {
        let temp = TempDir::new().unwrap();
        let file = FileStore::new(temp.path());
        let memory = MemoryStore::new();
        for store in [&file as &dyn KvStore, &memory] {
            assert!(!store.contains("apps").await.unwrap());
            store.set("apps", "[]").await.unwrap();
            assert!(store.contains("apps").await.unwrap());
            store.remove("apps").await.unwrap();
            assert!(!store.contains("apps").await.unwrap());
        }
    }

    #[tokio::test]
    async fn file_store_remove() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        store.set("apps", "x").await.unwrap();
        assert!(store.remove("apps").await.unwrap());
        assert!(!store.remove("apps").await.unwrap());
        assert_eq!(store.get("apps").await.unwrap(), None);
    }

    #[test]
    fn keys_are_sanitized() {
        let store = FileStore::new("/tmp/x");
        assert_eq!(
            store.path_for("user/../secret key"),
            PathBuf::from("/tmp/x/user_.._secret_key.slot")
        );
    }

    #[tokio::test]
    async fn timestamps_are_epoch_millis() {
        let store = MemoryStore::new();
        let ts = DateTime::from_timestamp_millis(1_736_500_000_123).unwrap();
        set_timestamp(&store, "ts", ts).await.unwrap();
        assert_eq!(
            store.get("ts").await.unwrap().as_deref(),
            Some("1736500000123")
        );
        assert_eq!(get_timestamp(&store, "ts").await.unwrap(), Some(ts));

        store.set("ts", "garbage").await.unwrap();
        assert_eq!(get_timestamp(&store, "ts").await.unwrap(), None);
    }
}
