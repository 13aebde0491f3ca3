//! The remote catalog: record types, wire envelopes and the HTTP client.

pub mod client;
pub mod entry;
pub mod errors;
pub mod json;
pub mod links;
pub mod user;

pub use client::{CatalogClient, CatalogSource};
pub use entry::{CatalogEntry, dedupe_by_id, normalize};
pub use errors::CatalogError;
pub use user::{UserRecord, can_download_vip};

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One wholesale copy of the remote catalog and the time it was fetched.
///
/// Snapshots are replaced, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSnapshot {
    pub entries: Vec<CatalogEntry>,
    pub fetched_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    pub fn new(entries: Vec<CatalogEntry>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            entries,
            fetched_at,
        }
    }

    /// Stamp entries with the current time at the millisecond granularity the
    /// cache persists.
    pub fn fetched_now(entries: Vec<CatalogEntry>) -> Self {
        let now = Utc::now();
        let fetched_at = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        Self::new(entries, fetched_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `GET ?action=getApps` response body.
#[derive(Debug, Deserialize)]
pub(crate) struct CatalogEnvelope {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub data: Option<Vec<CatalogEntry>>,
    #[serde(default)]
    pub message: Option<String>,
}

impl CatalogEnvelope {
    /// Unwrap the entry list, rejecting anything but an explicit success.
    pub(crate) fn into_entries(self) -> Result<Vec<CatalogEntry>, CatalogError> {
        match self.success {
            None => Err(CatalogError::protocol("response has no success flag")),
            Some(false) => Err(CatalogError::protocol(
                self.message
                    .unwrap_or_else(|| "catalog endpoint reported failure".to_owned()),
            )),
            Some(true) => self
                .data
                .ok_or_else(|| CatalogError::protocol("successful response has no data")),
        }
    }
}

/// `GET ?action=autoRefreshUser` response body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRefresh {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub auto_refreshed: bool,
    #[serde(default)]
    pub data: Option<UserRecord>,
    #[serde(default)]
    pub message: Option<String>,
}

impl IdentityRefresh {
    /// The refreshed record, only when the server says it actually refreshed.
    pub fn refreshed_record(self) -> Option<UserRecord> {
        if self.success && self.auto_refreshed {
            self.data
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_requires_success_flag() {
        let env: CatalogEnvelope = json::decode(r#"{"data": []}"#).unwrap();
        assert!(env.into_entries().unwrap_err().is_protocol());
    }

    #[test]
    fn envelope_failure_carries_message() {
        let env: CatalogEnvelope =
            json::decode(r#"{"success": false, "message": "quota exceeded"}"#).unwrap();
        let err = env.into_entries().unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn envelope_success_without_data() {
        let env: CatalogEnvelope = json::decode(r#"{"success": true}"#).unwrap();
        assert!(env.into_entries().is_err());
    }

    #[test]
    fn malformed_entry_list_is_protocol_error() {
        let err = json::decode::<CatalogEnvelope>(r#"{"success": true, "data": "nope"}"#)
            .unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn identity_refresh_gating() {
        let r: IdentityRefresh = json::decode(
            r#"{"success": true, "autoRefreshed": false, "data": {"email": "a@b.c"}}"#,
        )
        .unwrap();
        assert!(r.refreshed_record().is_none());

        let r: IdentityRefresh = json::decode(
            r#"{"success": true, "autoRefreshed": true, "data": {"email": "a@b.c", "packageType": "free"}}"#,
        )
        .unwrap();
        assert_eq!(r.refreshed_record().unwrap().package(), "free");
    }

    #[test]
    fn fetched_now_is_millisecond_granular() {
        let snap = CatalogSnapshot::fetched_now(Vec::new());
        assert_eq!(snap.fetched_at.timestamp_subsec_nanos() % 1_000_000, 0);
        assert!(snap.is_empty());
    }
}
