//! Error types for the catalog layer.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Transport failure or a non-success HTTP status.
    #[error("catalog request failed: {0}")]
    Network(#[source] anyhow::Error),
    #[error("catalog request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// The body did not match the expected `{ success, data }` envelope.
    #[error("malformed catalog response: {0}")]
    Protocol(String),
    /// Local persistence read or write failure.
    #[error("catalog storage failed: {0}")]
    Storage(#[source] anyhow::Error),
}

impl CatalogError {
    pub fn network(message: impl std::fmt::Display) -> Self {
        Self::Network(anyhow::anyhow!("{message}"))
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Timeouts count as network failures.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Classify a reqwest failure, keeping timeouts distinct.
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() {
            Self::Protocol(err.to_string())
        } else {
            Self::Network(err.into())
        }
    }
}
