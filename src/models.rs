//! Core data models used throughout the engine.
//!
//! These types represent the crawled documents, the raw corpus rows they are
//! validated from, and the ranked results handed back to callers.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Placeholder the crawler writes when a page has no meta description.
pub const NO_DESCRIPTION: &str = "No Description";

/// Raw corpus row as read from a corpus file, before validation.
///
/// Every column is optional here; [`crate::corpus::load`] decides which
/// rows become [`Document`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusRow {
    pub url: Option<String>,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub body_text: Option<String>,
    pub depth: Option<String>,
    pub last_crawled: Option<String>,
    pub out_links: Option<String>,
    pub anchor_texts: Option<String>,
}

impl From<&Document> for CorpusRow {
    /// Re-express a stored document as a row, so stored and freshly read
    /// rows can go through the same load pass.
    fn from(doc: &Document) -> Self {
        Self {
            url: Some(doc.url.clone()),
            title: doc.title.clone(),
            meta_description: doc.meta_description.clone(),
            body_text: Some(doc.body_text.clone()),
            depth: Some(doc.depth.to_string()),
            last_crawled: doc.last_crawled.as_ref().map(format_timestamp),
            out_links: serde_json::to_string(&doc.out_links).ok(),
            anchor_texts: serde_json::to_string(&doc.anchor_texts).ok(),
        }
    }
}

/// A crawled page, validated and keyed by URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub body_text: String,
    pub depth: u32,
    pub last_crawled: Option<NaiveDateTime>,
    pub out_links: Vec<String>,
    /// Same length and order as `out_links`.
    pub anchor_texts: Vec<String>,
}

impl Document {
    /// Title, description and body joined by single spaces; missing fields
    /// contribute an empty string.
    pub fn indexable_text(&self) -> String {
        format!(
            "{} {} {}",
            self.title.as_deref().unwrap_or(""),
            self.meta_description.as_deref().unwrap_or(""),
            self.body_text
        )
    }

    /// Change marker for re-embedding decisions. Not a content identifier.
    pub fn content_hash(&self) -> String {
        content_hash(&self.url, &self.indexable_text())
    }
}

/// SHA-256 over `"{url}::{text}"`, hex encoded.
pub fn content_hash(url: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"::");
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Parse the crawl timestamp formats seen in corpus files.
///
/// Accepts `2024-05-01 10:00:00[.ffffff]`, the `T`-separated variant,
/// RFC 3339 (converted to UTC) and bare dates.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Canonical text form used when a timestamp is written back out.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()
}

/// Display metadata stored alongside each vector in an index snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub url: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub body_text: String,
    pub depth: u32,
    pub last_crawled: Option<String>,
}

impl From<&Document> for DocumentMeta {
    fn from(doc: &Document) -> Self {
        Self {
            url: doc.url.clone(),
            title: doc.title.clone(),
            meta_description: doc.meta_description.clone(),
            body_text: doc.body_text.clone(),
            depth: doc.depth,
            last_crawled: doc.last_crawled.as_ref().map(format_timestamp),
        }
    }
}

/// One entry of a ranked result list.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedResult {
    pub url: String,
    pub title: Option<String>,
    pub meta_description: String,
    /// The score the list is ordered by (combined score for fused modes).
    pub score: f64,
    /// Cosine similarity to the query.
    pub similarity: f64,
    /// Normalized PageRank, when the mode used it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagerank: Option<f64>,
    /// Normalized HITS authority, when the mode used it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority: Option<f64>,
}
