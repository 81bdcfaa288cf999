//! Catalog filter/view engine: pure derivation of the visible listing set.
//!
//! `apply_filters` is a total, synchronous function from `(records, filter)`
//! to a [`DerivedView`]; it never errors and is cheap enough to re-run on
//! every keystroke. The [`CatalogViewModel`] owns the latest records
//! snapshot plus the session-scoped [`FilterState`] and re-derives the view
//! on demand.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use worknest_core::{ListingKind, ListingRecord, ALL};

pub const CRATE_NAME: &str = "worknest-catalog";

/// How many entries the related-items rail shows on a detail page.
pub const RELATED_LIMIT: usize = 2;

/// Mutually exclusive marketplace tabs; exactly one is always active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Gigs,
    Posts,
}

impl Tab {
    /// The listing kind this tab displays.
    pub fn kind(self) -> ListingKind {
        match self {
            Tab::Gigs => ListingKind::Gig,
            Tab::Posts => ListingKind::Job,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tab::Gigs => "gigs",
            Tab::Posts => "posts",
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tab {
    type Err = UnknownTab;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gigs" => Ok(Tab::Gigs),
            "posts" => Ok(Tab::Posts),
            other => Err(UnknownTab(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTab(pub String);

impl fmt::Display for UnknownTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tab `{}`", self.0)
    }
}

impl std::error::Error for UnknownTab {}

/// Session-scoped filter selections. Created with all-defaults when a view
/// mounts, mutated by user interaction, discarded on unmount; never
/// persisted anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    /// Closed-set category, or [`ALL`] for no category filter.
    pub category: String,
    /// Additional closed-set selections keyed by attribute name
    /// (e.g. `difficulty`, `type`). [`ALL`] entries are no-ops.
    pub secondary: BTreeMap<String, String>,
    /// Free-text query; empty string means no text filter.
    pub search_query: String,
    pub active_tab: Tab,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            category: ALL.to_string(),
            secondary: BTreeMap::new(),
            search_query: String::new(),
            active_tab: Tab::default(),
        }
    }
}

impl FilterState {
    /// Returns a copy with category, secondary filters, and search reset.
    /// The active tab is a navigation concern and survives. Idempotent.
    pub fn cleared(&self) -> Self {
        Self {
            active_tab: self.active_tab,
            ..Self::default()
        }
    }

    /// True when any predicate other than the tab partition is in effect.
    pub fn is_filtered(&self) -> bool {
        self.category != ALL
            || !self.search_query.is_empty()
            || self.secondary.values().any(|v| v != ALL)
    }

    /// Best-effort, one-directional mirror of category and tab into a query
    /// string for shareable links. Not authoritative state.
    pub fn query_string(&self) -> String {
        let mut query = format!("?tab={}", self.active_tab);
        if self.category != ALL {
            query.push_str("&category=");
            query.push_str(&encode_component(&self.category));
        }
        query
    }
}

/// Percent-encodes every byte outside the URL "unreserved" set.
/// Form-urlencoded parsers decode a bare `+` as a space, so closed-set
/// values like `C++` must be encoded in full to round-trip.
pub fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for &byte in value.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Per-tab counts over the filtered-but-not-yet-partitioned set, used for
/// tab-label badges. Invariant across tab switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TabCounts {
    pub gigs: usize,
    pub posts: usize,
}

impl TabCounts {
    pub fn for_tab(&self, tab: Tab) -> usize {
        match tab {
            Tab::Gigs => self.gigs,
            Tab::Posts => self.posts,
        }
    }
}

/// Computed, render-ready result of applying a [`FilterState`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedView {
    /// Records passing all predicates, scoped to the active tab, in the
    /// original input order.
    pub visible: Vec<ListingRecord>,
    pub counts: TabCounts,
}

/// Applies the conjunction of category, secondary, and search predicates,
/// then partitions by tab.
///
/// Counts are taken before the tab partition, so switching tabs only
/// changes which partition is visible, never the filtered set itself.
pub fn apply_filters(records: &[ListingRecord], filter: &FilterState) -> DerivedView {
    let needle = filter.search_query.to_lowercase();

    let filtered: Vec<&ListingRecord> = records
        .iter()
        .filter(|record| {
            matches_classification(record, "category", &filter.category)
                && filter
                    .secondary
                    .iter()
                    .all(|(attribute, selected)| matches_classification(record, attribute, selected))
                && matches_search(record, &needle)
        })
        .collect();

    let mut counts = TabCounts::default();
    for record in &filtered {
        match record.kind {
            ListingKind::Gig => counts.gigs += 1,
            ListingKind::Job => counts.posts += 1,
        }
    }

    let wanted = filter.active_tab.kind();
    let visible = filtered
        .into_iter()
        .filter(|record| record.kind == wanted)
        .cloned()
        .collect();

    DerivedView { visible, counts }
}

/// Exact-match-or-`All` rule shared by the category and secondary
/// predicates. `All` passes regardless of whether the record carries the
/// attribute; any other selection fails records missing it.
fn matches_classification(record: &ListingRecord, attribute: &str, selected: &str) -> bool {
    selected == ALL || record.classification(attribute) == Some(selected)
}

/// Case-insensitive substring match, OR'd across every searchable field.
fn matches_search(record: &ListingRecord, needle: &str) -> bool {
    needle.is_empty()
        || record
            .searchable_fields()
            .any(|field| field.to_lowercase().contains(needle))
}

/// Picks the [`RELATED_LIMIT`] most recent records other than the current
/// one, newest first. The sort is stable, so equal timestamps keep their
/// original relative order.
pub fn related_listings(records: &[ListingRecord], current_id: &str) -> Vec<ListingRecord> {
    let mut rest: Vec<&ListingRecord> = records.iter().filter(|r| r.id != current_id).collect();
    rest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rest.into_iter().take(RELATED_LIMIT).cloned().collect()
}

/// Opaque token tying a fetch completion back to the request that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

/// Explicit-lifetime view model owned by the presentation layer.
///
/// Holds the latest completed records snapshot and the session filter
/// state; re-derives the view on demand rather than caching it.
#[derive(Debug, Default)]
pub struct CatalogViewModel {
    records: Vec<ListingRecord>,
    filter: FilterState,
    issued_fetches: u64,
}

impl CatalogViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<ListingRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn records(&self) -> &[ListingRecord] {
        &self.records
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    /// Issues a ticket for a fetch about to start. Tickets are ordered;
    /// completing with anything but the newest ticket is a stale response.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.issued_fetches += 1;
        FetchTicket(self.issued_fetches)
    }

    /// Installs a fetched snapshot unless a newer fetch was issued in the
    /// meantime (last-write-wins on records). Returns whether the snapshot
    /// was applied.
    pub fn complete_fetch(&mut self, ticket: FetchTicket, records: Vec<ListingRecord>) -> bool {
        if ticket.0 < self.issued_fetches {
            return false;
        }
        self.records = records;
        true
    }

    pub fn set_category(&mut self, category: impl Into<String>) {
        self.filter.category = category.into();
    }

    pub fn set_secondary(&mut self, attribute: impl Into<String>, selected: impl Into<String>) {
        self.filter.secondary.insert(attribute.into(), selected.into());
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.filter.search_query = query.into();
    }

    /// Tab switches re-partition the already-filtered set; they never
    /// touch the other predicates.
    pub fn set_tab(&mut self, tab: Tab) {
        self.filter.active_tab = tab;
    }

    pub fn clear_filters(&mut self) {
        self.filter = self.filter.cleared();
    }

    pub fn view(&self) -> DerivedView {
        apply_filters(&self.records, &self.filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn mk(
        id: &str,
        kind: ListingKind,
        category: &str,
        title: &str,
        price: f64,
        day: u32,
    ) -> ListingRecord {
        ListingRecord {
            id: id.to_string(),
            kind,
            title: title.to_string(),
            description: format!("{title} description"),
            category: category.to_string(),
            price,
            skills: vec!["Figma".to_string()],
            difficulty: None,
            listing_type: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).single().expect("ts"),
            tags: vec![],
        }
    }

    fn sample_records() -> Vec<ListingRecord> {
        vec![
            mk("g-1", ListingKind::Gig, "Design", "Logo Design", 150.0, 1),
            mk("j-1", ListingKind::Job, "Design", "Need a logo", 100.0, 2),
            mk("g-2", ListingKind::Gig, "Writing", "Blog post", 80.0, 3),
        ]
    }

    #[test]
    fn defaults_only_partition_by_kind() {
        let records = sample_records();
        let view = apply_filters(&records, &FilterState::default());
        let expected: Vec<ListingRecord> = records
            .iter()
            .filter(|r| r.kind == ListingKind::Gig)
            .cloned()
            .collect();
        assert_eq!(view.visible, expected);
        assert_eq!(view.counts, TabCounts { gigs: 2, posts: 1 });
    }

    #[test]
    fn category_scopes_gigs_tab_and_counts_cover_both_tabs() {
        let records = sample_records();
        let filter = FilterState {
            category: "Design".to_string(),
            ..FilterState::default()
        };
        let view = apply_filters(&records, &filter);
        assert_eq!(view.visible.len(), 1);
        assert_eq!(view.visible[0].title, "Logo Design");
        assert_eq!(view.visible[0].price, 150.0);
        assert_eq!(view.counts, TabCounts { gigs: 1, posts: 1 });
        assert!(view.visible.iter().all(|r| r.category == "Design"));
    }

    #[test]
    fn search_matches_posts_tab_case_insensitively() {
        let records = sample_records();
        let filter = FilterState {
            search_query: "logo".to_string(),
            active_tab: Tab::Posts,
            ..FilterState::default()
        };
        let view = apply_filters(&records, &filter);
        assert_eq!(view.visible.len(), 1);
        assert_eq!(view.visible[0].title, "Need a logo");
        assert_eq!(view.visible[0].price, 100.0);
    }

    #[test]
    fn search_matches_skills_individually() {
        let records = sample_records();
        let filter = FilterState {
            search_query: "figma".to_string(),
            ..FilterState::default()
        };
        let view = apply_filters(&records, &filter);
        assert_eq!(view.counts, TabCounts { gigs: 2, posts: 1 });
    }

    #[test]
    fn no_match_query_empties_every_tab() {
        let records = sample_records();
        for tab in [Tab::Gigs, Tab::Posts] {
            let filter = FilterState {
                search_query: "xyz-nomatch".to_string(),
                active_tab: tab,
                ..FilterState::default()
            };
            let view = apply_filters(&records, &filter);
            assert!(view.visible.is_empty());
            assert_eq!(view.counts, TabCounts { gigs: 0, posts: 0 });
        }
    }

    #[test]
    fn empty_records_yield_empty_view_not_error() {
        let view = apply_filters(&[], &FilterState::default());
        assert!(view.visible.is_empty());
        assert_eq!(view.counts, TabCounts::default());
    }

    #[test]
    fn category_match_is_case_sensitive() {
        let records = sample_records();
        let filter = FilterState {
            category: "design".to_string(),
            ..FilterState::default()
        };
        let view = apply_filters(&records, &filter);
        assert!(view.visible.is_empty());
        assert_eq!(view.counts, TabCounts::default());
    }

    #[test]
    fn secondary_filters_are_conjunctive_and_all_passes_missing_fields() {
        let mut records = sample_records();
        records[0].difficulty = Some("Beginner".to_string());

        let mut filter = FilterState::default();
        filter.secondary.insert("difficulty".to_string(), "Beginner".to_string());
        let view = apply_filters(&records, &filter);
        assert_eq!(view.visible.len(), 1);
        assert_eq!(view.visible[0].id, "g-1");

        // A record missing the field fails any concrete selection but
        // always passes the All sentinel.
        filter.secondary.insert("difficulty".to_string(), ALL.to_string());
        let view = apply_filters(&records, &filter);
        assert_eq!(view.counts, TabCounts { gigs: 2, posts: 1 });
    }

    #[test]
    fn clear_then_apply_equals_fresh_default_state() {
        let records = sample_records();
        let dirty = FilterState {
            category: "Design".to_string(),
            search_query: "logo".to_string(),
            active_tab: Tab::Posts,
            secondary: BTreeMap::from([("difficulty".to_string(), "Beginner".to_string())]),
        };
        let cleared = dirty.cleared();
        assert_eq!(cleared.active_tab, Tab::Posts);
        assert_eq!(cleared.cleared(), cleared);

        let fresh = FilterState {
            active_tab: Tab::Posts,
            ..FilterState::default()
        };
        assert_eq!(apply_filters(&records, &cleared), apply_filters(&records, &fresh));
    }

    #[test]
    fn tab_switch_never_changes_counts() {
        let records = sample_records();
        let mut filter = FilterState {
            search_query: "logo".to_string(),
            ..FilterState::default()
        };
        let gigs_view = apply_filters(&records, &filter);
        filter.active_tab = Tab::Posts;
        let posts_view = apply_filters(&records, &filter);
        assert_eq!(gigs_view.counts, posts_view.counts);
    }

    #[test]
    fn visible_records_preserve_input_order() {
        let records = vec![
            mk("g-3", ListingKind::Gig, "Design", "Third", 10.0, 9),
            mk("g-4", ListingKind::Gig, "Design", "First", 20.0, 3),
            mk("g-5", ListingKind::Gig, "Design", "Second", 30.0, 6),
        ];
        let view = apply_filters(&records, &FilterState::default());
        let ids: Vec<&str> = view.visible.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["g-3", "g-4", "g-5"]);
    }

    #[test]
    fn related_listings_take_two_most_recent_excluding_current() {
        let records = vec![
            mk("a", ListingKind::Gig, "Design", "A", 1.0, 1),
            mk("b", ListingKind::Gig, "Design", "B", 1.0, 5),
            mk("c", ListingKind::Gig, "Design", "C", 1.0, 3),
            mk("d", ListingKind::Job, "Design", "D", 1.0, 4),
            mk("e", ListingKind::Gig, "Design", "E", 1.0, 2),
        ];
        let related = related_listings(&records, "b");
        let ids: Vec<&str> = related.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["d", "c"]);
    }

    #[test]
    fn related_listings_break_timestamp_ties_by_input_order() {
        let records = vec![
            mk("a", ListingKind::Gig, "Design", "A", 1.0, 2),
            mk("b", ListingKind::Gig, "Design", "B", 1.0, 2),
            mk("c", ListingKind::Gig, "Design", "C", 1.0, 2),
        ];
        let related = related_listings(&records, "c");
        let ids: Vec<&str> = related.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn viewmodel_discards_stale_fetch_completions() {
        let mut vm = CatalogViewModel::new();
        let first = vm.begin_fetch();
        let second = vm.begin_fetch();

        // The newer request resolves first; the older response must lose.
        assert!(vm.complete_fetch(second, sample_records()));
        assert!(!vm.complete_fetch(first, vec![]));
        assert_eq!(vm.records().len(), 3);
    }

    #[test]
    fn viewmodel_mutations_flow_into_the_derived_view() {
        let mut vm = CatalogViewModel::with_records(sample_records());
        vm.set_category("Design");
        vm.set_search_query("logo");
        vm.set_tab(Tab::Posts);
        assert_eq!(vm.view().visible.len(), 1);

        vm.clear_filters();
        assert_eq!(vm.filter().active_tab, Tab::Posts);
        assert!(!vm.filter().is_filtered());
        assert_eq!(vm.view().counts, TabCounts { gigs: 2, posts: 1 });
    }

    #[test]
    fn query_string_mirrors_category_and_tab_only() {
        let filter = FilterState {
            category: "Graphics & Design".to_string(),
            search_query: "logo".to_string(),
            active_tab: Tab::Posts,
            ..FilterState::default()
        };
        assert_eq!(filter.query_string(), "?tab=posts&category=Graphics%20%26%20Design");
        assert_eq!(FilterState::default().query_string(), "?tab=gigs");
    }

    #[test]
    fn component_encoding_covers_plus_and_non_ascii() {
        assert_eq!(encode_component("C++"), "C%2B%2B");
        assert_eq!(encode_component("Café"), "Caf%C3%A9");
        assert_eq!(encode_component("logo design"), "logo%20design");
        assert_eq!(encode_component("video-editing_2.0~beta"), "video-editing_2.0~beta");
    }
}
