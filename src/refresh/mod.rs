//! Stale-while-revalidate orchestration of the catalog.
//!
//! A session serves the persisted snapshot immediately when it is still
//! valid, then refreshes it in the background. Without a valid snapshot the
//! first fetch happens in the foreground. Fetch failures fall back to the
//! last good catalog; only a session with nothing at all to show fails.
//!
//! State is published through a `watch` channel, so readers always get the
//! current value without waiting on a refresh. Overlapping refreshes are
//! allowed and the last one to complete wins, since every snapshot replaces
//! its predecessor wholesale.

mod auto;
mod state;

pub use state::{LoadedCatalog, Origin, Phase, SessionState};

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogEntry, CatalogError, CatalogSnapshot, CatalogSource, UserRecord};
use crate::store::{CachePolicy, CatalogCache, KvStore};
use crate::utils::{fmt_duration, log_if_slow};
use crate::view::{self, Projector, Selection};
use auto::AutoRefreshHandle;

/// Poll interval for identity refresh.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Fetches slower than this are logged at `warn`.
const SLOW_FETCH: Duration = Duration::from_secs(3);

/// Where the last polled user record is persisted.
#[derive(Clone)]
pub struct UserSlot {
    pub store: Arc<dyn KvStore>,
    pub key: String,
}

/// Everything a refresh needs. Shared with background tasks, which is why
/// the auto-refresh handle lives outside it.
pub(crate) struct SessionCore {
    source: Arc<dyn CatalogSource>,
    cache: CatalogCache,
    policy: CachePolicy,
    user_slot: Option<UserSlot>,
    tx: watch::Sender<SessionState>,
}

impl SessionCore {
    fn state(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    fn apply(&self, snapshot: CatalogSnapshot, origin: Origin) -> Arc<LoadedCatalog> {
        let featured = view::featured(&snapshot.entries);
        let loaded = Arc::new(LoadedCatalog {
            snapshot,
            featured,
            origin,
        });
        self.tx.send_modify(|s| {
            s.phase = Phase::Ready;
            s.catalog = Some(loaded.clone());
            s.error = None;
        });
        info!(
            entries = loaded.snapshot.len(),
            origin = ?origin,
            "Catalog ready"
        );
        loaded
    }

    /// Fetch, persist and publish a fresh snapshot.
    ///
    /// On failure the session keeps (or falls back to) the last good catalog
    /// and only enters `Failed` when there is none.
    async fn refresh(&self) -> Result<Arc<LoadedCatalog>, Arc<CatalogError>> {
        self.tx.send_modify(|s| s.phase = Phase::Loading);
        let start = Instant::now();

        let err = match self.source.fetch_all().await {
            Ok(snapshot) => {
                log_if_slow(start, SLOW_FETCH, "catalog fetch");
                debug!(elapsed = fmt_duration(start.elapsed()), "Catalog fetch finished");
                self.cache.write(&snapshot).await;
                return Ok(self.apply(snapshot, Origin::Network));
            }
            Err(e) => Arc::new(e),
        };

        if let Some(current) = self.state().catalog {
            warn!(error = %err, "Catalog refresh failed, keeping current catalog");
            self.tx.send_modify(|s| {
                s.phase = Phase::Ready;
                s.error = Some(err.clone());
            });
            return Ok(current);
        }

        if let Some(stale) = self.cache.read().await.filter(|s| !s.is_empty()) {
            warn!(
                error = %err,
                fetched_at = %stale.fetched_at,
                "Catalog fetch failed, falling back to cached snapshot"
            );
            let loaded = self.apply(stale, Origin::Cache);
            self.tx.send_modify(|s| s.error = Some(err.clone()));
            return Ok(loaded);
        }

        error!(error = %err, "Catalog fetch failed with nothing cached");
        self.tx.send_modify(|s| {
            s.phase = Phase::Failed;
            s.error = Some(err.clone());
        });
        Err(err)
    }

    async fn load_user(&self) -> Option<UserRecord> {
        let slot = self.user_slot.as_ref()?;
        let raw = match slot.store.get(&slot.key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = ?e, "Failed to read stored user record");
                return None;
            }
        };
        serde_json::from_str(&raw)
            .inspect_err(|e| warn!(error = %e, "Stored user record is corrupt, ignoring it"))
            .ok()
    }

    async fn store_user(&self, record: &UserRecord) {
        let Some(slot) = &self.user_slot else {
            return;
        };
        let result = match serde_json::to_string(record) {
            Ok(body) => slot.store.set(&slot.key, &body).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(error = ?e, "Failed to persist user record");
        }
    }
}

/// Orchestrates one browsing session's catalog. Clone-cheap; clones share
/// the same session.
#[derive(Clone)]
pub struct RefreshScheduler {
    core: Arc<SessionCore>,
    poll_interval: Duration,
    projector: Projector,
    auto: Arc<Mutex<Option<AutoRefreshHandle>>>,
    revalidation: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Configures a [`RefreshScheduler`] before any of its state is shared.
pub struct RefreshSchedulerBuilder {
    source: Arc<dyn CatalogSource>,
    cache: CatalogCache,
    policy: CachePolicy,
    user_slot: Option<UserSlot>,
    poll_interval: Duration,
    projector: Projector,
}

impl RefreshSchedulerBuilder {
    /// Persist polled user records in `slot`, and compare against the stored
    /// record when polling starts.
    pub fn with_user_slot(mut self, slot: UserSlot) -> Self {
        self.user_slot = Some(slot);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_projector(mut self, projector: Projector) -> Self {
        self.projector = projector;
        self
    }

    pub fn build(self) -> RefreshScheduler {
        let (tx, _rx) = watch::channel(SessionState::default());
        RefreshScheduler {
            core: Arc::new(SessionCore {
                source: self.source,
                cache: self.cache,
                policy: self.policy,
                user_slot: self.user_slot,
                tx,
            }),
            poll_interval: self.poll_interval,
            projector: self.projector,
            auto: Arc::new(Mutex::new(None)),
            revalidation: Arc::new(Mutex::new(None)),
        }
    }
}

impl RefreshScheduler {
    pub fn builder(
        source: Arc<dyn CatalogSource>,
        cache: CatalogCache,
        policy: CachePolicy,
    ) -> RefreshSchedulerBuilder {
        RefreshSchedulerBuilder {
            source,
            cache,
            policy,
            user_slot: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            projector: Projector::default(),
        }
    }

    /// A scheduler with default polling, no user slot and the default
    /// projector.
    pub fn new(source: Arc<dyn CatalogSource>, cache: CatalogCache, policy: CachePolicy) -> Self {
        Self::builder(source, cache, policy).build()
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.core.cache
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.core.policy
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.core.tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    pub fn catalog(&self) -> Option<Arc<LoadedCatalog>> {
        self.core.state().catalog
    }

    /// Bring the session to `Ready` or `Failed`.
    ///
    /// A valid, non-empty cached snapshot is served at once and revalidated
    /// in the background; otherwise this waits for a network fetch.
    pub async fn start(&self) -> SessionState {
        self.core.tx.send_modify(|s| s.phase = Phase::Loading);

        if self.core.cache.is_valid(&self.core.policy).await
            && let Some(snapshot) = self.core.cache.read().await
            && !snapshot.is_empty()
        {
            debug!(fetched_at = %snapshot.fetched_at, "Serving catalog from cache");
            self.core.apply(snapshot, Origin::Cache);
            let handle = self.spawn_revalidate();
            self.revalidation
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .replace(handle);
            return self.state();
        }

        let _ = self.core.refresh().await;
        self.state()
    }

    /// Re-run the full load after a failure.
    pub async fn retry(&self) -> SessionState {
        info!("Retrying catalog load");
        self.start().await
    }

    /// Fetch now, regardless of cache age.
    pub async fn refresh(&self) -> Result<Arc<LoadedCatalog>, Arc<CatalogError>> {
        self.core.refresh().await
    }

    /// Refresh on a background task without disturbing the current catalog.
    pub fn spawn_revalidate(&self) -> JoinHandle<()> {
        let core = self.core.clone();
        tokio::spawn(async move {
            if let Err(e) = core.refresh().await {
                debug!(error = %e, "Background revalidation failed");
            }
        })
    }

    /// Project the current catalog; empty while nothing is loaded.
    pub fn project(&self, selection: &Selection) -> Vec<CatalogEntry> {
        self.catalog()
            .map(|c| self.projector.project(c.entries(), selection))
            .unwrap_or_default()
    }

    pub fn games_rail(&self, selection: &Selection) -> Option<Vec<CatalogEntry>> {
        let catalog = self.catalog()?;
        self.projector.games_rail(catalog.entries(), selection)
    }

    /// Start polling `identity` for account changes, replacing any poller
    /// already running for this session.
    pub fn start_auto_refresh(&self, identity: &str) {
        let identity = identity.trim();
        if identity.is_empty() {
            return;
        }
        let handle = AutoRefreshHandle::spawn(
            self.core.clone(),
            identity.to_owned(),
            self.poll_interval,
        );
        let previous = self
            .auto
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            debug!(identity = previous.identity(), "Replacing existing auto-refresh poller");
        }
        info!(identity, interval = fmt_duration(self.poll_interval), "Auto-refresh started");
    }

    /// Identity currently being polled, if any.
    pub fn auto_refresh_identity(&self) -> Option<String> {
        self.auto
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|h| h.identity().to_owned())
    }

    /// Stop polling and wait briefly for the poller to exit.
    pub async fn stop_auto_refresh(&self) {
        let handle = self
            .auto
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.stop().await;
            info!("Auto-refresh stopped");
        }
    }

    /// Wait for the revalidation started by [`start`](Self::start), if any.
    pub async fn settle(&self, timeout: Duration) {
        let handle = self
            .revalidation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        if tokio::time::timeout(timeout, handle).await.is_err() {
            warn!(
                timeout = fmt_duration(timeout),
                "Background revalidation still running, abandoning it"
            );
        }
    }

    /// End the session: stops polling and gives an in-flight revalidation a
    /// few seconds to land in the cache.
    pub async fn shutdown(&self) {
        self.stop_auto_refresh().await;
        self.settle(SHUTDOWN_GRACE).await;
    }
}
