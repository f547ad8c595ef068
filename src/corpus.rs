//! Corpus Store: validation and deduplication of crawled rows.
//!
//! [`load`] turns raw [`CorpusRow`]s into a [`Corpus`] in four ordered steps:
//!
//! 1. stable sort by `last_crawled` ascending (unparseable timestamps last),
//! 2. drop exact-URL duplicates, keeping the earliest crawl,
//! 3. drop rows missing `url` or `body_text` (logged, never fatal),
//! 4. drop rows whose `(host, directory, slug)` key was already seen.
//!
//! The key in step 4 catches URLs that differ only superficially
//! (`https://site.com/a/b/` vs `https://SITE.com/a/b`).

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use url::Url;

use crate::error::EngineError;
use crate::links::{parse_anchor_texts, parse_out_links, LinkField};
use crate::models::{parse_timestamp, CorpusRow, Document};

/// Heuristic duplicate key: `(host[:port], directory, final segment)`.
pub type UrlKey = (String, String, String);

/// Deduplicated, ordered collection of documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    docs: Vec<Document>,
    /// URL → position in `docs`.
    by_url: HashMap<String, usize>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap documents that already passed [`load`], e.g. read back from the
    /// corpus database in stored order.
    pub fn from_loaded(docs: Vec<Document>) -> Self {
        let mut by_url = HashMap::with_capacity(docs.len());
        for (pos, doc) in docs.iter().enumerate() {
            by_url.entry(doc.url.clone()).or_insert(pos);
        }
        Self { docs, by_url }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.docs
    }

    pub fn get(&self, url: &str) -> Option<&Document> {
        self.by_url.get(url).map(|&pos| &self.docs[pos])
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.docs
    }
}

/// What [`load`] did to its input.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub input_rows: usize,
    pub duplicate_urls: usize,
    pub duplicate_keys: usize,
    /// Rows rejected for missing required fields.
    pub skipped: Vec<EngineError>,
    /// Rows whose `out_links` had text but no recoverable links.
    pub unparseable_links: usize,
    pub unique_documents: usize,
}

/// Build a deduplicated corpus from raw rows.
pub fn load(rows: Vec<CorpusRow>) -> (Corpus, LoadReport) {
    let mut report = LoadReport {
        input_rows: rows.len(),
        ..LoadReport::default()
    };

    // Step 1: stable sort, earliest crawl first. Input position is kept so
    // skip reports can name the original row.
    let mut rows: Vec<(usize, Option<NaiveDateTime>, CorpusRow)> = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            let ts = row.last_crawled.as_deref().and_then(parse_timestamp);
            (i, ts, row)
        })
        .collect();
    rows.sort_by(|a, b| match (&a.1, &b.1) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    // Step 2: exact URL dedup.
    let mut seen_urls: HashSet<String> = HashSet::new();
    rows.retain(|(_, _, row)| match &row.url {
        Some(url) => {
            if seen_urls.insert(url.clone()) {
                true
            } else {
                report.duplicate_urls += 1;
                false
            }
        }
        None => true,
    });

    // Step 3: required fields.
    let mut docs: Vec<Document> = Vec::with_capacity(rows.len());
    for (row_idx, ts, row) in rows {
        match into_document(row, ts) {
            Ok((doc, links_field)) => {
                if let LinkField::Unparseable(raw) = &links_field {
                    tracing::warn!(
                        url = %doc.url,
                        value = %truncate(raw, 60),
                        "out_links unparseable; treating as no links"
                    );
                    report.unparseable_links += 1;
                }
                docs.push(doc);
            }
            Err(reason) => {
                let err = EngineError::Ingestion {
                    row: row_idx + 1,
                    reason,
                };
                tracing::warn!("skipping corpus row: {}", err);
                report.skipped.push(err);
            }
        }
    }

    // Step 4: heuristic URL key dedup.
    let mut seen_keys: HashSet<UrlKey> = HashSet::new();
    docs.retain(|doc| match url_key(&doc.url) {
        Some(key) => {
            if seen_keys.insert(key) {
                true
            } else {
                report.duplicate_keys += 1;
                false
            }
        }
        None => true,
    });

    report.unique_documents = docs.len();
    (Corpus::from_loaded(docs), report)
}

/// Validate one row into a [`Document`].
fn into_document(
    row: CorpusRow,
    last_crawled: Option<NaiveDateTime>,
) -> Result<(Document, LinkField), String> {
    let url = non_empty(row.url).ok_or_else(|| "missing url".to_string())?;
    let body_text = non_empty(row.body_text)
        .ok_or_else(|| format!("missing body_text for {}", url))?;

    let depth = row
        .depth
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(|d| d as u32)
        .unwrap_or(0);

    let links_field = parse_out_links(row.out_links.as_deref());
    let out_links = links_field.clone().into_links();
    let anchor_texts = parse_anchor_texts(row.anchor_texts.as_deref(), out_links.len());

    Ok((
        Document {
            url,
            title: non_empty(row.title),
            meta_description: non_empty(row.meta_description),
            body_text,
            depth,
            last_crawled,
            out_links,
            anchor_texts,
        },
        links_field,
    ))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Compute the `(host, directory, slug)` duplicate key for a URL.
///
/// The path loses its trailing slashes, then splits at the last `/`:
/// `/a/b/` → (`/a`, `b`), `/a` → (``, `a`), `/` → (``, ``).
/// Returns `None` for URLs that cannot be parsed or have no host; such
/// URLs never collide on this key.
pub fn url_key(raw: &str) -> Option<UrlKey> {
    let parsed = Url::parse(raw.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let netloc = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    };

    let path = parsed.path().trim_end_matches('/');
    let (directory, slug) = match path.rfind('/') {
        Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
        None => (String::new(), path.to_string()),
    };
    Some((netloc, directory, slug))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(url: &str, body: &str, crawled: &str) -> CorpusRow {
        CorpusRow {
            url: Some(url.to_string()),
            title: Some(format!("Title of {}", url)),
            meta_description: None,
            body_text: Some(body.to_string()),
            depth: Some("1".into()),
            last_crawled: Some(crawled.to_string()),
            out_links: None,
            anchor_texts: None,
        }
    }

    #[test]
    fn test_url_key_shapes() {
        assert_eq!(
            url_key("https://Site.com/a/b/"),
            Some(("site.com".into(), "/a".into(), "b".into()))
        );
        assert_eq!(
            url_key("https://site.com/a"),
            Some(("site.com".into(), "".into(), "a".into()))
        );
        assert_eq!(
            url_key("https://site.com/"),
            Some(("site.com".into(), "".into(), "".into()))
        );
        assert_eq!(
            url_key("http://site.com:8080/x/y?q=1"),
            Some(("site.com:8080".into(), "/x".into(), "y".into()))
        );
        assert_eq!(url_key("not a url"), None);
    }

    #[test]
    fn test_url_key_dedup_keeps_earliest() {
        let rows = vec![
            row("https://SITE.com/a/b", "later copy", "2024-01-02 00:00:00"),
            row("https://site.com/a/b/", "earlier copy", "2024-01-01 00:00:00"),
        ];
        let (corpus, report) = load(rows);
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.documents()[0].url, "https://site.com/a/b/");
        assert_eq!(corpus.documents()[0].body_text, "earlier copy");
        assert_eq!(report.duplicate_keys, 1);
        assert_eq!(report.unique_documents, 1);
    }

    #[test]
    fn test_get_by_url() {
        let rows = vec![
            row("https://a.com/1", "one", "2024-01-02 00:00:00"),
            row("https://a.com/2", "two", "2024-01-01 00:00:00"),
        ];
        let (corpus, _) = load(rows);
        assert_eq!(corpus.get("https://a.com/1").map(|d| d.body_text.as_str()), Some("one"));
        assert_eq!(corpus.get("https://a.com/2").map(|d| d.body_text.as_str()), Some("two"));
        assert!(corpus.get("https://a.com/3").is_none());

        let reloaded = Corpus::from_loaded(corpus.clone().into_documents());
        assert_eq!(reloaded.get("https://a.com/1"), corpus.get("https://a.com/1"));
        assert!(Corpus::new().get("https://a.com/1").is_none());
    }

    #[test]
    fn test_exact_url_dedup_keeps_earliest() {
        let rows = vec![
            row("https://a.com/x", "second", "2024-03-01 00:00:00"),
            row("https://a.com/x", "first", "2024-02-01 00:00:00"),
        ];
        let (corpus, report) = load(rows);
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.documents()[0].body_text, "first");
        assert_eq!(report.duplicate_urls, 1);
    }

    #[test]
    fn test_missing_fields_are_skipped_not_fatal() {
        let mut no_body = row("https://a.com/empty", "", "2024-01-01");
        no_body.body_text = None;
        let mut no_url = row("https://a.com/ignored", "text", "2024-01-01");
        no_url.url = None;
        let rows = vec![no_body, no_url, row("https://a.com/ok", "text", "2024-01-01")];

        let (corpus, report) = load(rows);
        assert_eq!(corpus.len(), 1);
        assert_eq!(report.skipped.len(), 2);
        assert!(report
            .skipped
            .iter()
            .all(|e| e.code() == "ingestion_error"));
    }

    #[test]
    fn test_load_is_idempotent() {
        let rows = vec![
            row("https://a.com/1", "one", "2024-01-03"),
            row("https://a.com/1/", "dup", "2024-01-04"),
            row("https://b.com/2", "two", "2024-01-01"),
            row("https://c.com/3", "three", "2024-01-02"),
        ];
        let (first, _) = load(rows);
        let again: Vec<CorpusRow> = first.documents().iter().map(CorpusRow::from).collect();
        let (second, report) = load(again);
        assert_eq!(first, second);
        assert_eq!(report.duplicate_urls + report.duplicate_keys, 0);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_sorted_by_crawl_time_with_unparseable_last() {
        let rows = vec![
            row("https://a.com/late", "x", "2024-06-01"),
            row("https://a.com/unknown", "x", "whenever"),
            row("https://a.com/early", "x", "2024-01-01"),
        ];
        let (corpus, _) = load(rows);
        let urls: Vec<&str> = corpus.documents().iter().map(|d| d.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://a.com/early",
                "https://a.com/late",
                "https://a.com/unknown"
            ]
        );
    }

    #[test]
    fn test_unparseable_urls_never_collide_on_key() {
        let rows = vec![
            row("garbage-one", "x", "2024-01-01"),
            row("garbage-two", "y", "2024-01-02"),
        ];
        let (corpus, _) = load(rows);
        assert_eq!(corpus.len(), 2);
    }

    #[test]
    fn test_links_parsed_at_boundary() {
        let mut r = row("https://a.com/x", "body", "2024-01-01");
        r.out_links = Some("['https://b.com/1', 'https://b.com/2']".into());
        r.anchor_texts = Some("['One']".into());
        let (corpus, _) = load(vec![r]);
        let doc = &corpus.documents()[0];
        assert_eq!(doc.out_links.len(), 2);
        assert_eq!(doc.anchor_texts, vec!["One".to_string(), String::new()]);
    }

    #[test]
    fn test_sentinel_links_counted_as_none() {
        let mut r = row("https://a.com/x", "body", "2024-01-01");
        r.out_links = Some("1".into());
        let mut u = row("https://a.com/y", "body", "2024-01-01");
        u.out_links = Some("no links here".into());
        let (corpus, report) = load(vec![r, u]);
        assert!(corpus.documents().iter().all(|d| d.out_links.is_empty()));
        assert_eq!(report.unparseable_links, 1);
    }
}
