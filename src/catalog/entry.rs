//! Catalog records as the sheet endpoint serves them, plus normalization.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::links::is_plausible_image_url;

/// Tag assigned to entries that arrive without any category.
pub const DEFAULT_CATEGORY: &str = "other";

/// Tag that marks an entry as a game.
pub const GAME_CATEGORY: &str = "game";

/// Screenshot slots and the column aliases the sheet has used for each.
const SCREENSHOT_ALIASES: [[&str; 5]; 3] = [
    ["screenshot1", "Screenshot1", "screenshot_1", "image1", "Image1"],
    ["screenshot2", "Screenshot2", "screenshot_2", "image2", "Image2"],
    ["screenshot3", "Screenshot3", "screenshot_3", "image3", "Image3"],
];

/// One distributable application.
///
/// Field names follow the sheet's column headers on the wire. Columns this
/// type does not model are kept in `extra` so a cached snapshot round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    /// Comma-joined tag list.
    #[serde(
        default,
        deserialize_with = "lenient::categories",
        skip_serializing_if = "Option::is_none"
    )]
    pub categories: Option<String>,
    /// Newline-delimited feature bullets.
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    #[serde(
        rename = "updatedate",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub image: Option<String>,
    #[serde(
        rename = "downloadlink",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub download_link: Option<String>,
    #[serde(
        rename = "viplink1",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub vip_link: Option<String>,
    /// Comma list of packages allowed to use `vip_link`, or `all`.
    #[serde(
        rename = "vipPermissions",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub vip_permissions: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CatalogEntry {
    /// Numeric value of the id, parsed the way the storefront always has:
    /// leading digits only, anything unparsable counts as 0.
    pub fn numeric_id(&self) -> i64 {
        leading_int(&self.id)
    }

    /// Trimmed, non-empty category tags.
    pub fn category_tags(&self) -> impl Iterator<Item = &str> {
        self.categories
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
    }

    pub fn has_category(&self, tag: &str) -> bool {
        self.category_tags().any(|t| t == tag)
    }

    pub fn is_game(&self) -> bool {
        self.has_category(GAME_CATEGORY)
    }

    /// Local calendar date of the last update, if the value parses.
    pub fn updated_on(&self) -> Option<NaiveDate> {
        self.updated_at.as_deref().and_then(parse_update_date)
    }

    /// Non-blank description lines, trimmed. Cards show the first two.
    pub fn feature_lines(&self) -> impl Iterator<Item = &str> {
        self.description
            .as_deref()
            .unwrap_or("")
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }

    /// Up to three screenshot URLs, skipping slots without a plausible image.
    pub fn screenshots(&self) -> Vec<&str> {
        SCREENSHOT_ALIASES
            .iter()
            .filter_map(|aliases| {
                aliases
                    .iter()
                    .filter_map(|key| self.extra.get(*key).and_then(|v| v.as_str()))
                    .map(str::trim)
                    .find(|url| is_plausible_image_url(url))
            })
            .collect()
    }
}

/// Fill in defaults for a raw record.
///
/// Only `categories` is ever defaulted. The function is pure, so re-running
/// it on normalized data is a no-op.
pub fn normalize(mut entry: CatalogEntry) -> CatalogEntry {
    let blank = entry
        .categories
        .as_deref()
        .is_none_or(|c| c.trim().is_empty());
    if blank {
        entry.categories = Some(DEFAULT_CATEGORY.to_owned());
    }
    entry
}

/// Collapse records that share an id. The later record wins and takes the
/// position of the first occurrence. Records without an id are distinct apps
/// and pass through untouched.
pub fn dedupe_by_id(entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(entries.len());
    let mut out: Vec<CatalogEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        let key = entry.id.trim();
        if key.is_empty() {
            out.push(entry);
            continue;
        }
        match slots.get(key) {
            Some(&idx) => out[idx] = entry,
            None => {
                slots.insert(key.to_owned(), out.len());
                out.push(entry);
            }
        }
    }
    out
}

/// Parse an update date in any of the formats the sheet has produced.
/// Full timestamps are converted to the local calendar date.
pub fn parse_update_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local).date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// `parseInt`-style integer prefix: optional sign then digits. Prefixes too
/// long for `i64` saturate so they still sort above shorter ids.
fn leading_int(raw: &str) -> i64 {
    let s = raw.trim_start();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let digits = &digits[..end];
    if digits.is_empty() {
        return 0;
    }
    match digits.parse::<i64>() {
        Ok(n) if negative => -n,
        Ok(n) => n,
        Err(_) if negative => i64::MIN,
        Err(_) => i64::MAX,
    }
}

/// Deserializers tolerant of the sheet's loose typing: numbers where strings
/// are expected, arrays where a comma list is expected, and nulls anywhere.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn scalar_to_string(value: Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(match n.as_f64() {
                Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                    format!("{}", f as i64)
                }
                _ => n.to_string(),
            }),
            other => Some(other.to_string()),
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(scalar_to_string(Value::deserialize(d)?).unwrap_or_default())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(scalar_to_string(Value::deserialize(d)?))
    }

    pub fn categories<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        match Value::deserialize(d)? {
            Value::Array(items) => {
                let joined = items
                    .into_iter()
                    .filter_map(scalar_to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                Ok(Some(joined))
            }
            other => Ok(scalar_to_string(other)),
        }
    }
}
