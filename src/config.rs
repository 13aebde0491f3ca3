//! Configuration loaded from defaults, an optional TOML file and the
//! environment.
//!
//! Environment variables use the `STOREFRONT_` prefix, so `endpoint` is set
//! with `STOREFRONT_ENDPOINT`.

use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::store::{CacheKeys, CachePolicy, CatalogCache, FileStore, KvStore};
use crate::view::{CategoryLabels, Projector, SearchMode};

/// File read when no `--config` path is given. Its absence is not an error.
pub const DEFAULT_CONFIG_FILE: &str = "storefront.toml";

pub const ENV_PREFIX: &str = "STOREFRONT_";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Remote catalog script URL.
    pub endpoint: Url,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_cache_key")]
    pub cache_key: String,
    #[serde(default = "default_cache_timestamp_key")]
    pub cache_timestamp_key: String,
    #[serde(default = "default_user_key")]
    pub user_key: String,
    #[serde(default = "default_ttl_millis")]
    pub ttl_millis: u64,
    #[serde(default = "default_fetch_timeout_millis")]
    pub fetch_timeout_millis: u64,
    #[serde(default = "default_auto_refresh_interval_millis")]
    pub auto_refresh_interval_millis: u64,
    #[serde(default)]
    pub search_mode: SearchMode,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub category_labels: CategoryLabels,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".storefront-cache")
}

fn default_cache_key() -> String {
    CacheKeys::default().entries
}

fn default_cache_timestamp_key() -> String {
    CacheKeys::default().timestamp
}

fn default_user_key() -> String {
    "currentUser".to_owned()
}

fn default_ttl_millis() -> u64 {
    30 * 60 * 1000
}

fn default_fetch_timeout_millis() -> u64 {
    10_000
}

fn default_auto_refresh_interval_millis() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Config {
    /// The layered provider stack. An explicit `path` must exist; the default
    /// file is optional.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let file = match path {
            Some(path) => {
                if !path.is_file() {
                    bail!("Config file {} does not exist", path.display());
                }
                Toml::file_exact(path)
            }
            None => Toml::file(DEFAULT_CONFIG_FILE),
        };
        Ok(Figment::new()
            .merge(file)
            .merge(Env::prefixed(ENV_PREFIX)))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path)?)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().context("Failed to load config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !matches!(self.endpoint.scheme(), "http" | "https") {
            bail!("endpoint must be an http(s) URL, got {}", self.endpoint);
        }
        if self.ttl_millis == 0 {
            bail!("ttl_millis must be greater than zero");
        }
        if self.fetch_timeout_millis == 0 {
            bail!("fetch_timeout_millis must be greater than zero");
        }
        if self.auto_refresh_interval_millis == 0 {
            bail!("auto_refresh_interval_millis must be greater than zero");
        }
        if self.cache_key == self.cache_timestamp_key {
            bail!("cache_key and cache_timestamp_key must differ");
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_millis)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_millis)
    }

    pub fn auto_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.auto_refresh_interval_millis)
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy::new(self.ttl())
    }

    pub fn cache_keys(&self) -> CacheKeys {
        CacheKeys {
            entries: self.cache_key.clone(),
            timestamp: self.cache_timestamp_key.clone(),
        }
    }

    pub fn projector(&self) -> Projector {
        Projector::new(self.search_mode)
    }

    /// File-backed store rooted at `cache_dir`.
    pub fn open_store(&self) -> Arc<dyn KvStore> {
        Arc::new(FileStore::new(&self.cache_dir))
    }

    pub fn catalog_cache(&self, store: Arc<dyn KvStore>) -> CatalogCache {
        CatalogCache::new(store, self.cache_keys())
    }
}
