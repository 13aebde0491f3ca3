//! Derived views over the in-memory catalog.
//!
//! Everything here is a pure function of the entries and the caller's
//! selection; nothing is cached or persisted.

use chrono::{Local, NaiveDate};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::str::FromStr;

use crate::catalog::CatalogEntry;

/// Category value that disables category filtering.
pub const ALL_CATEGORIES: &str = "all";

/// How many of the newest entries the featured carousel draws from.
pub const FEATURED_POOL: usize = 20;

/// How many entries the featured carousel shows.
pub const FEATURED_COUNT: usize = 5;

/// Top-level page tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Home,
    /// Entries updated on the current local date.
    Today,
    /// Entries tagged `game`.
    Games,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            View::Home => "home",
            View::Today => "today",
            View::Games => "games",
        }
    }
}

/// Unknown tab names fall back to the home view.
impl FromStr for View {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "today" => View::Today,
            "games" => View::Games,
            _ => View::Home,
        })
    }
}

/// Name matching rule for search.
///
/// `Prefix` is the storefront's behaviour. `Contains` reproduces the looser
/// name-or-description match some older pages used and is opt-in only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Prefix,
    Contains,
}

/// The user's current browsing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub view: View,
    pub category: String,
    pub search_term: String,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            view: View::Home,
            category: ALL_CATEGORIES.to_owned(),
            search_term: String::new(),
        }
    }
}

impl Selection {
    pub fn view(view: View) -> Self {
        Self {
            view,
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search_term = term.into();
        self
    }

    fn category_filter(&self) -> Option<&str> {
        let category = self.category.trim();
        (!category.is_empty() && category != ALL_CATEGORIES).then_some(category)
    }

    fn search_filter(&self) -> Option<String> {
        let term = self.search_term.trim();
        (!term.is_empty()).then(|| term.to_lowercase())
    }

    /// The home page shows a separate games rail only when nothing narrows it.
    pub fn shows_games_rail(&self) -> bool {
        self.view == View::Home && self.category_filter().is_none() && self.search_filter().is_none()
    }
}

/// Computes projections under a search rule. "Today" is the local date at
/// projection time unless pinned with [`on`](Self::on).
#[derive(Debug, Clone, Copy, Default)]
pub struct Projector {
    pub search_mode: SearchMode,
    pinned_today: Option<NaiveDate>,
}

impl Projector {
    pub fn new(search_mode: SearchMode) -> Self {
        Self {
            search_mode,
            pinned_today: None,
        }
    }

    /// Evaluate the `today` view against a fixed date.
    pub fn on(mut self, today: NaiveDate) -> Self {
        self.pinned_today = Some(today);
        self
    }

    /// The date the `today` view currently matches.
    pub fn today(&self) -> NaiveDate {
        self.pinned_today
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// View filter, then category, then search, then newest first.
    pub fn project(&self, entries: &[CatalogEntry], selection: &Selection) -> Vec<CatalogEntry> {
        let category = selection.category_filter();
        let term = selection.search_filter();
        let today = self.today();

        let mut out: Vec<CatalogEntry> = entries
            .iter()
            .filter(|e| in_view(e, selection.view, today))
            .filter(|e| category.is_none_or(|c| e.has_category(c)))
            .filter(|e| term.as_deref().is_none_or(|t| self.matches(e, t)))
            .cloned()
            .collect();
        sort_newest_first(&mut out);
        out
    }

    /// All games, newest first, when the selection calls for the rail.
    pub fn games_rail(
        &self,
        entries: &[CatalogEntry],
        selection: &Selection,
    ) -> Option<Vec<CatalogEntry>> {
        selection
            .shows_games_rail()
            .then(|| self.project(entries, &Selection::view(View::Games)))
    }

    /// `term` is already lowercased.
    fn matches(&self, entry: &CatalogEntry, term: &str) -> bool {
        let name = entry.name.to_lowercase();
        match self.search_mode {
            SearchMode::Prefix => name.starts_with(term),
            SearchMode::Contains => {
                name.contains(term)
                    || entry
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(term))
            }
        }
    }
}

fn in_view(entry: &CatalogEntry, view: View, today: NaiveDate) -> bool {
    match view {
        View::Home => true,
        View::Today => entry.updated_on() == Some(today),
        View::Games => entry.is_game(),
    }
}

/// Project with the default rules for the current local date.
pub fn project(entries: &[CatalogEntry], selection: &Selection) -> Vec<CatalogEntry> {
    Projector::default().project(entries, selection)
}

/// Stable sort by descending numeric id.
pub fn sort_newest_first(entries: &mut [CatalogEntry]) {
    entries.sort_by_key(|e| Reverse(e.numeric_id()));
}

/// Pick the carousel: five random entries out of the twenty newest.
pub fn featured_with<R: Rng + ?Sized>(entries: &[CatalogEntry], rng: &mut R) -> Vec<CatalogEntry> {
    let mut pool = entries.to_vec();
    sort_newest_first(&mut pool);
    pool.truncate(FEATURED_POOL);
    pool.choose_multiple(rng, FEATURED_COUNT).cloned().collect()
}

pub fn featured(entries: &[CatalogEntry]) -> Vec<CatalogEntry> {
    featured_with(entries, &mut rand::rng())
}

/// Look up an entry by id, tolerating numeric ids written differently and
/// slugged ids such as `123-some-app`.
pub fn find_by_id<'a>(entries: &'a [CatalogEntry], id: &str) -> Option<&'a CatalogEntry> {
    let raw = id.trim();
    let exact = |id: &str| entries.iter().find(|e| e.id.trim() == id);
    exact(raw)
        .or_else(|| exact(strip_slug(raw)))
        .or_else(|| {
            let wanted = strip_slug(raw).parse::<i64>().ok()?;
            entries
                .iter()
                .find(|e| e.id.trim().parse::<i64>().ok() == Some(wanted))
        })
}

/// The numeric id of a `<digits>-<name>` slug, or the input unchanged.
pub fn strip_slug(raw: &str) -> &str {
    match raw.split_once('-') {
        Some((id, name))
            if !id.is_empty() && !name.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) =>
        {
            id
        }
        _ => raw,
    }
}

/// Shareable `<id>-<name>` slug. Only ASCII word characters of the name
/// survive; an entry without a usable name slugs to its bare id.
pub fn seo_slug(id: &str, name: &str) -> String {
    let kept: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    let words: Vec<&str> = kept.split_whitespace().collect();
    let slug = words.join("-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        id.trim().to_owned()
    } else {
        format!("{}-{slug}", id.trim())
    }
}

/// Display labels for category tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryLabels(BTreeMap<String, String>);

impl Default for CategoryLabels {
    fn default() -> Self {
        let labels = [
            ("game", "Trò chơi"),
            ("social", "Mạng xã hội"),
            ("entertainment", "Giải trí"),
            ("photo", "Ảnh & Video"),
            ("clone", "Nhân bản"),
            ("premium", "Mở khoá Premium"),
            ("education", "Giáo dục"),
            ("health", "Sức khỏe"),
            ("utility", "Tiện ích"),
        ];
        Self(
            labels
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        )
    }
}

impl CategoryLabels {
    /// Label for `tag`, or the tag itself when unlabeled.
    pub fn label<'a>(&'a self, tag: &'a str) -> &'a str {
        self.0.get(tag).map(String::as_str).unwrap_or(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Headline for the main list under `selection`.
    pub fn section_title(&self, selection: &Selection) -> String {
        if let Some(term) = selection.search_filter() {
            return format!("Kết quả tìm kiếm: \"{term}\"");
        }
        match (selection.view, selection.category_filter()) {
            (View::Today, _) => "Ứng dụng hôm nay".to_owned(),
            (View::Games, _) => self.label("game").to_owned(),
            (View::Home, Some(category)) => self.label(category).to_owned(),
            (View::Home, None) => "Ứng dụng mới".to_owned(),
        }
    }
}

/// Message shown in place of an empty projection.
pub fn empty_state_message(selection: &Selection, today: NaiveDate) -> String {
    if let Some(term) = selection.search_filter() {
        format!("Không tìm thấy ứng dụng nào bắt đầu bằng \"{term}\"")
    } else if selection.view == View::Today {
        format!(
            "Không có ứng dụng nào được đăng vào {}",
            today.format("%d/%m/%Y")
        )
    } else {
        "Không có ứng dụng nào.".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    fn entry(id: &str, name: &str, categories: &str) -> CatalogEntry {
        serde_json::from_value(json!({"id": id, "name": name, "categories": categories}))
            .unwrap()
    }

    fn ids(entries: &[CatalogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    fn sample() -> Vec<CatalogEntry> {
        vec![
            entry("3", "Apollo", "social"),
            entry("10", "Asphalt", "game"),
            entry("7", "Banana", "game,premium"),
            entry("x", "avatar", "photo"),
            entry("5", "Clash", "game"),
        ]
    }

    #[test]
    fn home_sorts_by_numeric_id_descending() {
        let out = project(&sample(), &Selection::default());
        assert_eq!(ids(&out), vec!["10", "7", "5", "3", "x"]);
    }

    #[test]
    fn games_view_keeps_only_games() {
        let out = project(&sample(), &Selection::view(View::Games));
        assert_eq!(ids(&out), vec!["10", "7", "5"]);
        assert!(out.iter().all(CatalogEntry::is_game));
    }

    #[test]
    fn games_view_is_order_independent() {
        let mut reversed = sample();
        reversed.reverse();
        assert_eq!(
            ids(&project(&reversed, &Selection::view(View::Games))),
            ids(&project(&sample(), &Selection::view(View::Games)))
        );
    }

    #[test]
    fn search_is_case_insensitive_prefix() {
        let out = project(&sample(), &Selection::default().with_search("a"));
        assert_eq!(ids(&out), vec!["10", "3", "x"]);
        assert!(!out.iter().any(|e| e.name == "Banana"));
    }

    #[test]
    fn blank_search_is_ignored() {
        let out = project(&sample(), &Selection::default().with_search("   "));
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn contains_mode_matches_description() {
        let mut entries = sample();
        entries[4].description = Some("Tower defence with clans".into());
        let projector = Projector::new(SearchMode::Contains);

        let out = projector.project(&entries, &Selection::default().with_search("ANA"));
        assert_eq!(ids(&out), vec!["7"]);
        let out = projector.project(&entries, &Selection::default().with_search("clans"));
        assert_eq!(ids(&out), vec!["5"]);
    }

    #[test]
    fn category_filter_applies_after_view() {
        let sel = Selection::view(View::Games).with_category("premium");
        assert_eq!(ids(&project(&sample(), &sel)), vec!["7"]);

        let sel = Selection::default().with_category("social");
        assert_eq!(ids(&project(&sample(), &sel)), vec!["3"]);
    }

    #[test]
    fn today_view_uses_update_date() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let mut entries = sample();
        entries[0].updated_at = Some("2025-03-14".into());
        entries[1].updated_at = Some("03/14/2025".into());
        entries[2].updated_at = Some("2025-03-13".into());
        entries[3].updated_at = Some("garbage".into());

        let out = Projector::default()
            .on(today)
            .project(&entries, &Selection::view(View::Today));
        assert_eq!(ids(&out), vec!["10", "3"]);
    }

    #[test]
    fn unpinned_today_follows_the_clock() {
        let projector = Projector::default();
        let now = Local::now().date_naive();
        assert_eq!(projector.today(), now);

        let mut entries = sample();
        entries[1].updated_at = Some(now.format("%Y-%m-%d").to_string());
        let out = projector.project(&entries, &Selection::view(View::Today));
        assert_eq!(ids(&out), vec![entries[1].id.as_str()]);

        let yesterday = now.pred_opt().unwrap();
        let pinned = projector.on(yesterday);
        assert_eq!(pinned.today(), yesterday);
        assert!(pinned
            .project(&entries, &Selection::view(View::Today))
            .is_empty());
    }

    #[test]
    fn ties_keep_input_order() {
        let entries = vec![
            entry("abc", "first", "other"),
            entry("", "second", "other"),
            entry("0", "third", "other"),
        ];
        let out = project(&entries, &Selection::default());
        let names: Vec<_> = out.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let out = project(&sample(), &Selection::default().with_search("zzz"));
        assert!(out.is_empty());
    }

    #[test]
    fn games_rail_only_on_unfiltered_home() {
        let projector = Projector::default();
        let rail = projector.games_rail(&sample(), &Selection::default()).unwrap();
        assert_eq!(ids(&rail), vec!["10", "7", "5"]);

        assert!(projector
            .games_rail(&sample(), &Selection::default().with_search("a"))
            .is_none());
        assert!(projector
            .games_rail(&sample(), &Selection::default().with_category("game"))
            .is_none());
        assert!(projector
            .games_rail(&sample(), &Selection::view(View::Today))
            .is_none());
    }

    #[test]
    fn featured_draws_from_newest_twenty() {
        let entries: Vec<_> = (1..=40)
            .map(|i| entry(&i.to_string(), &format!("app {i}"), "other"))
            .collect();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..20 {
            let picked = featured_with(&entries, &mut rng);
            assert_eq!(picked.len(), FEATURED_COUNT);
            assert!(picked.iter().all(|e| e.numeric_id() > 20));

            let mut unique: Vec<_> = ids(&picked);
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), FEATURED_COUNT);
        }
    }

    #[test]
    fn featured_with_small_catalog() {
        let picked = featured(&sample()[..3]);
        assert_eq!(picked.len(), 3);
        assert!(featured(&[]).is_empty());
    }

    #[test]
    fn find_by_id_tolerates_formatting() {
        let entries = sample();
        assert_eq!(find_by_id(&entries, "7").unwrap().name, "Banana");
        assert_eq!(find_by_id(&entries, " 10 ").unwrap().name, "Asphalt");
        assert_eq!(find_by_id(&entries, "007").unwrap().name, "Banana");
        assert!(find_by_id(&entries, "99").is_none());
    }

    #[test]
    fn find_by_id_accepts_slugs() {
        let entries = sample();
        assert_eq!(find_by_id(&entries, "7-banana").unwrap().name, "Banana");
        assert_eq!(find_by_id(&entries, "10-any-old-name").unwrap().name, "Asphalt");
        assert!(find_by_id(&entries, "99-banana").is_none());
        assert!(find_by_id(&entries, "-7").is_none());

        assert_eq!(strip_slug("123-spotify"), "123");
        assert_eq!(strip_slug("123-"), "123-");
        assert_eq!(strip_slug("abc-def"), "abc-def");
    }

    #[test]
    fn seo_slugs_round_trip_through_lookup() {
        assert_eq!(seo_slug("123", "Spotify++ Premium"), "123-spotify-premium");
        assert_eq!(seo_slug("4", "  YouTube   Plus! "), "4-youtube-plus");
        assert_eq!(seo_slug("5", "!!!"), "5");
        assert_eq!(seo_slug("6", ""), "6");

        let entries = sample();
        let slug = seo_slug(&entries[2].id, &entries[2].name);
        assert_eq!(slug, "7-banana");
        assert_eq!(find_by_id(&entries, &slug).unwrap().id, "7");
    }

    #[test]
    fn view_parsing_falls_back_to_home() {
        assert_eq!("Games".parse::<View>().unwrap(), View::Games);
        assert_eq!("today".parse::<View>().unwrap(), View::Today);
        assert_eq!("search".parse::<View>().unwrap(), View::Home);
    }

    #[test]
    fn section_titles() {
        let labels = CategoryLabels::default();
        assert_eq!(labels.section_title(&Selection::default()), "Ứng dụng mới");
        assert_eq!(
            labels.section_title(&Selection::default().with_category("photo")),
            "Ảnh & Video"
        );
        assert_eq!(
            labels.section_title(&Selection::default().with_category("vpn")),
            "vpn"
        );
        assert_eq!(
            labels.section_title(&Selection::view(View::Games).with_search("Cl")),
            "Kết quả tìm kiếm: \"cl\""
        );
    }

    #[test]
    fn empty_state_for_today_names_the_date() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let msg = empty_state_message(&Selection::view(View::Today), today);
        assert!(msg.ends_with("14/03/2025"));
    }
}
