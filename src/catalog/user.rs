//! Signed-in user records and VIP download permissions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::entry::parse_update_date;

/// Package name of the unpaid tier.
pub const FREE_PACKAGE: &str = "free";

/// The identity-scoped record returned by the user refresh endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vip_expiry: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl UserRecord {
    /// Package name, treating an absent package as free.
    pub fn package(&self) -> &str {
        self.package_type.as_deref().unwrap_or(FREE_PACKAGE)
    }

    /// Premium accounts stay premium through their expiry date; a premium
    /// account without an expiry never lapses.
    pub fn is_premium_on(&self, today: NaiveDate) -> bool {
        if self.account_type.as_deref() != Some("premium") {
            return false;
        }
        match self.vip_expiry.as_deref() {
            Some(raw) => parse_update_date(raw).is_some_and(|expiry| expiry >= today),
            None => true,
        }
    }

    /// True when moving from `previous` to `self` dropped the account to the
    /// free tier. This is the change that makes cached VIP links stale.
    pub fn downgraded_from(&self, previous: &UserRecord) -> bool {
        self.package_type != previous.package_type
            && self.package_type.as_deref() == Some(FREE_PACKAGE)
    }
}

/// Whether a user on `package` may use an entry's VIP link.
///
/// Absent permissions or `all` allow everyone; otherwise the package must be
/// paid and appear in the comma list.
pub fn can_download_vip(permissions: Option<&str>, package: Option<&str>) -> bool {
    let permissions = permissions.map(str::trim).unwrap_or("");
    if permissions.is_empty() || permissions == "all" {
        return true;
    }
    let Some(package) = package.filter(|p| !p.is_empty() && *p != FREE_PACKAGE) else {
        return false;
    };
    permissions.split(',').map(str::trim).any(|p| p == package)
}
