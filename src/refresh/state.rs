//! Observable state of a catalog session.

use std::sync::Arc;

use crate::catalog::{CatalogEntry, CatalogError, CatalogSnapshot};

/// Lifecycle of a session: `Idle -> Loading -> {Ready, Failed}`.
///
/// A background refresh moves `Ready` back to `Loading` while the catalog on
/// display stays readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Failed,
}

/// Where the catalog on display came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Network,
}

/// A catalog ready for display, with its carousel picked once at load time.
#[derive(Debug)]
pub struct LoadedCatalog {
    pub snapshot: CatalogSnapshot,
    pub featured: Vec<CatalogEntry>,
    pub origin: Origin,
}

impl LoadedCatalog {
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.snapshot.entries
    }
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: Phase,
    pub catalog: Option<Arc<LoadedCatalog>>,
    /// Most recent refresh failure. In `Ready` this is diagnostic only.
    pub error: Option<Arc<CatalogError>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            catalog: None,
            error: None,
        }
    }
}

impl SessionState {
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    pub fn is_failed(&self) -> bool {
        self.phase == Phase::Failed
    }
}
