//! Wire types shared across the pipeline.
//!
//! `PageData` is what crawlers send us; `Document` is what we forward to the
//! search backend. Field names mirror the backend's index schema, so renames
//! here are schema migrations, not refactors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// The extracted view of a crawled page, as produced by the crawler fleet.
/// Every field except `url` may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageData {
    pub url: String,
    #[serde(default)]
    pub canonical_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub charset: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub meta_keywords: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub headings: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub alt_texts: Vec<String>,
    #[serde(default)]
    pub anchor_texts: Vec<String>,
    #[serde(default)]
    pub internal_links: Vec<String>,
    #[serde(default)]
    pub external_links: Vec<String>,
    #[serde(default)]
    pub structured_data: Vec<String>,
    #[serde(default)]
    pub open_graph: HashMap<String, String>,
    #[serde(default)]
    pub date_published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub social_links: Vec<String>,
    #[serde(default)]
    pub visible_text: String,
    #[serde(default)]
    pub load_time: Duration,
    #[serde(default)]
    pub is_secure: bool,
    #[serde(default)]
    pub fetch_error: String,
}

/// The enriched, normalized record forwarded to the search backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    pub canonical_url: String,
    pub title: String,
    pub meta_description: String,
    pub visible_text: String,
    /// `"LABEL: text"` strings produced from NLP entity spans.
    pub entities: Vec<String>,
    pub keywords: Vec<String>,
    pub summary: String,
    pub internal_links: Vec<String>,
    pub external_links: Vec<String>,
    pub structured_data: StructuredData,
    pub open_graph: OpenGraph,
    pub date_published: Option<DateTime<Utc>>,
    pub date_modified: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub social_links: Vec<String>,
    /// Page fetch time in whole milliseconds; 0 when unknown.
    pub load_time: i64,
    pub is_secure: bool,
    /// 0 to 100 after capping and the spam penalty.
    pub quality_score: u32,
    pub inbound_link_count: u32,
    pub last_crawled: Option<DateTime<Utc>>,
    pub spam_score: u32,
    pub language: String,
}

/// Structured data block lifted from the page's JSON-LD, when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredData {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@type")]
    pub kind: String,
}

/// Open Graph metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenGraph {
    #[serde(rename = "og:title")]
    pub title: String,
    #[serde(rename = "og:description")]
    pub description: String,
    #[serde(rename = "og:image")]
    pub image: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_data_bincode_round_trip() {
        let page = PageData {
            url: "https://example.com/a".to_string(),
            title: "Example".to_string(),
            visible_text: "some text".to_string(),
            load_time: Duration::from_millis(742),
            is_secure: true,
            date_published: Some(Utc::now()),
            ..PageData::default()
        };

        let bytes = bincode::serialize(&page).unwrap();
        let decoded: PageData = bincode::deserialize(&bytes).unwrap();

        assert_eq!(decoded.url, page.url);
        assert_eq!(decoded.title, page.title);
        assert_eq!(decoded.load_time, page.load_time);
        assert!(decoded.is_secure);
    }

    #[test]
    fn document_json_uses_backend_field_names() {
        let doc = Document {
            url: "https://example.com".to_string(),
            quality_score: 80,
            ..Document::default()
        };

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["url"], "https://example.com");
        assert_eq!(value["quality_score"], 80);
        assert!(value["open_graph"].get("og:title").is_some());
        assert!(value["structured_data"].get("@context").is_some());
    }
}
