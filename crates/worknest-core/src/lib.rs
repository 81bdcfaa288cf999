//! Core domain model for WorkNest marketplace listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "worknest-core";

/// Sentinel category/classification value meaning "no filter applied".
pub const ALL: &str = "All";

/// Server-assigned listing kind. Immutable once a record is materialized;
/// drives the tab a record appears under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    /// Freelancer-offered service.
    Gig,
    /// Client-posted job request.
    Job,
}

/// A normalized marketplace entry.
///
/// Text fields default to empty strings and classification fields to `None`
/// when absent in the wire payload, so a partially populated record is still
/// filterable rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: String,
    pub kind: ListingKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub price: f64,
    /// Skills (gigs) or requirements (jobs), ordered.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Closed-set classification used by the resources variant.
    #[serde(default)]
    pub difficulty: Option<String>,
    /// Closed-set type classification used by the resources variant.
    #[serde(default, rename = "type")]
    pub listing_type: Option<String>,
    /// Recency ordering key. Missing timestamps deserialize to the Unix
    /// epoch so they sort last and never displace well-formed records.
    #[serde(default = "epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl ListingRecord {
    /// Looks up a closed-set classification attribute by name.
    ///
    /// Unknown attribute names resolve to `None`, which fails any exact-match
    /// predicate other than the `"All"` sentinel.
    pub fn classification(&self, attribute: &str) -> Option<&str> {
        match attribute {
            "category" => Some(self.category.as_str()),
            "difficulty" => self.difficulty.as_deref(),
            "type" => self.listing_type.as_deref(),
            _ => None,
        }
    }

    /// Every free-text-bearing field a search query is matched against.
    pub fn searchable_fields(&self) -> impl Iterator<Item = &str> {
        [self.title.as_str(), self.description.as_str(), self.category.as_str()]
            .into_iter()
            .chain(self.skills.iter().map(String::as_str))
            .chain(self.tags.iter().map(String::as_str))
            .chain(self.difficulty.as_deref())
            .chain(self.listing_type.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_payload_fills_defensive_defaults() {
        let record: ListingRecord =
            serde_json::from_str(r#"{"id": "g-1", "kind": "gig"}"#).expect("parse");
        assert_eq!(record.title, "");
        assert_eq!(record.category, "");
        assert!(record.difficulty.is_none());
        assert_eq!(record.created_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn kind_round_trips_lowercase() {
        let record: ListingRecord =
            serde_json::from_str(r#"{"id": "j-1", "kind": "job"}"#).expect("parse");
        assert_eq!(record.kind, ListingKind::Job);
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["kind"], "job");
    }

    #[test]
    fn classification_lookup_covers_known_attributes_only() {
        let record: ListingRecord = serde_json::from_str(
            r#"{"id": "r-1", "kind": "gig", "category": "Design", "difficulty": "Beginner", "type": "Video"}"#,
        )
        .expect("parse");
        assert_eq!(record.classification("category"), Some("Design"));
        assert_eq!(record.classification("difficulty"), Some("Beginner"));
        assert_eq!(record.classification("type"), Some("Video"));
        assert_eq!(record.classification("audience"), None);
    }

    #[test]
    fn searchable_fields_include_each_skill_and_tag() {
        let record: ListingRecord = serde_json::from_str(
            r#"{"id": "g-2", "kind": "gig", "title": "Logo Design", "skills": ["Figma", "Branding"], "tags": ["logo"]}"#,
        )
        .expect("parse");
        let fields: Vec<&str> = record.searchable_fields().collect();
        assert!(fields.contains(&"Figma"));
        assert!(fields.contains(&"Branding"));
        assert!(fields.contains(&"logo"));
    }
}
