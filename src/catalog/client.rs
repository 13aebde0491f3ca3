//! HTTP client for the sheet-backed catalog script.

use async_trait::async_trait;
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};
use url::Url;

use super::errors::CatalogError;
use super::{CatalogEnvelope, CatalogSnapshot, IdentityRefresh, dedupe_by_id, json, normalize};
use crate::utils::fmt_duration;

/// Anything that can produce catalog snapshots and identity refreshes.
///
/// The scheduler only talks to this trait; [`CatalogClient`] is the
/// production implementation.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch and normalize the full catalog. No retries.
    async fn fetch_all(&self) -> Result<CatalogSnapshot, CatalogError>;

    /// Ask the endpoint whether the record for `identity` changed.
    async fn poll_identity(&self, identity: &str) -> Result<IdentityRefresh, CatalogError>;
}

pub struct CatalogClient {
    http: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl CatalogClient {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("storefront/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Network(e.into()))?;
        Ok(Self {
            http,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn action_url(&self, action: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("action", action);
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        url
    }

    async fn get_body(&self, url: Url) -> Result<String, CatalogError> {
        let start = Instant::now();
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| CatalogError::from_reqwest(e, self.timeout))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::network(format!(
                "HTTP {status} from {}",
                url.path()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| CatalogError::from_reqwest(e, self.timeout))?;
        trace!(
            bytes = body.len(),
            elapsed = fmt_duration(start.elapsed()),
            "catalog endpoint responded"
        );
        Ok(body)
    }
}

#[async_trait]
impl CatalogSource for CatalogClient {
    async fn fetch_all(&self) -> Result<CatalogSnapshot, CatalogError> {
        let nonce = Utc::now().timestamp_millis().to_string();
        let url = self.action_url("getApps", &[("t", &nonce)]);
        debug!("fetching catalog");

        let body = self.get_body(url).await?;
        let raw = json::decode::<CatalogEnvelope>(&body)?.into_entries()?;
        let received = raw.len();
        let entries = dedupe_by_id(raw.into_iter().map(normalize).collect());

        info!(
            entries = entries.len(),
            duplicates = received - entries.len(),
            "catalog fetched"
        );
        Ok(CatalogSnapshot::fetched_now(entries))
    }

    async fn poll_identity(&self, identity: &str) -> Result<IdentityRefresh, CatalogError> {
        let url = self.action_url("autoRefreshUser", &[("email", identity)]);
        let body = self.get_body(url).await?;
        json::decode(&body)
    }
}
