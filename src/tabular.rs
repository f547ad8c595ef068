//! CSV reading and writing for corpus files and graph edge lists.
//!
//! Corpus files come from the crawler: a header row naming the columns,
//! `\` as escape character, quoted fields that may hold commas and
//! newlines. Older crawls lack the `depth` and `last_crawled` columns; for
//! those every row gets depth 1 and a synthetic timestamp one second apart
//! so that file order decides which duplicate survives.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::error::EngineError;
use crate::models::{format_timestamp, CorpusRow};

/// Rows read from one corpus file, plus the records that could not be read.
#[derive(Debug, Default)]
pub struct CorpusFile {
    pub rows: Vec<CorpusRow>,
    pub skipped: Vec<EngineError>,
    /// True when the file had no `depth`/`last_crawled` columns.
    pub legacy: bool,
}

/// Column positions resolved from a header row.
#[derive(Debug, Default)]
struct Columns {
    url: Option<usize>,
    title: Option<usize>,
    meta_description: Option<usize>,
    body_text: Option<usize>,
    depth: Option<usize>,
    last_crawled: Option<usize>,
    out_links: Option<usize>,
    anchor_texts: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Self {
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_lowercase(), i))
            .collect();
        let find = |names: &[&str]| names.iter().find_map(|n| index.get(*n).copied());
        Self {
            url: find(&["url"]),
            title: find(&["title"]),
            meta_description: find(&["meta_description", "description"]),
            body_text: find(&["body_text", "body", "text"]),
            depth: find(&["depth"]),
            last_crawled: find(&["last_crawled"]),
            out_links: find(&["out_links"]),
            anchor_texts: find(&["anchor_texts"]),
        }
    }

    fn is_legacy(&self) -> bool {
        self.depth.is_none() && self.last_crawled.is_none()
    }
}

fn cell(record: &StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Read a crawler corpus file.
///
/// `ingest_start` seeds the synthetic timestamps of legacy files.
pub fn read_corpus(path: &Path, ingest_start: NaiveDateTime) -> Result<CorpusFile> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .escape(Some(b'\\'))
        .from_path(path)
        .with_context(|| format!("Failed to open corpus file: {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header row: {}", path.display()))?
        .clone();
    let columns = Columns::from_headers(&headers);
    if columns.url.is_none() {
        anyhow::bail!(
            "Corpus file {} has no 'url' column (found: {})",
            path.display(),
            headers.iter().collect::<Vec<_>>().join(", ")
        );
    }
    let legacy = columns.is_legacy();
    if legacy {
        tracing::info!(
            file = %path.display(),
            "legacy corpus layout; assigning depth 1 and synthetic crawl times"
        );
    }

    let mut file = CorpusFile {
        legacy,
        ..CorpusFile::default()
    };
    for (i, record) in reader.records().enumerate() {
        // Header is line 1.
        let row_number = i + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                let err = EngineError::Ingestion {
                    row: row_number,
                    reason: format!("unreadable record: {}", e),
                };
                tracing::warn!(file = %path.display(), "skipping corpus row: {}", err);
                file.skipped.push(err);
                continue;
            }
        };

        let mut row = CorpusRow {
            url: cell(&record, columns.url),
            title: cell(&record, columns.title),
            meta_description: cell(&record, columns.meta_description),
            body_text: cell(&record, columns.body_text),
            depth: cell(&record, columns.depth),
            last_crawled: cell(&record, columns.last_crawled),
            out_links: cell(&record, columns.out_links),
            anchor_texts: cell(&record, columns.anchor_texts),
        };
        if legacy {
            row.depth = Some("1".to_string());
            let ts = ingest_start + Duration::seconds(i as i64);
            row.last_crawled = Some(format_timestamp(&ts));
        }
        file.rows.push(row);
    }

    Ok(file)
}

/// One row of a graph edge file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub destination: String,
    pub anchor: String,
}

/// Write edges as `source,destination,anchor` CSV.
pub fn write_edges<'a, I>(path: &Path, edges: I) -> Result<usize>
where
    I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("Failed to create edge file: {}", path.display()))?;

    let mut count = 0;
    for (source, destination, anchor) in edges {
        writer.serialize(EdgeRecord {
            source: source.to_string(),
            destination: destination.to_string(),
            anchor: anchor.to_string(),
        })?;
        count += 1;
    }
    if count == 0 {
        // serialize() writes the header lazily; keep empty files parseable.
        writer.write_record(["source", "destination", "anchor"])?;
    }
    writer.flush()?;
    Ok(count)
}

/// Read a `source,destination,anchor` edge file.
pub fn read_edges(path: &Path) -> Result<Vec<EdgeRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open edge file: {}", path.display()))?;
    let mut edges = Vec::new();
    for (i, record) in reader.deserialize::<EdgeRecord>().enumerate() {
        let edge = record.with_context(|| format!("{}: bad edge on row {}", path.display(), i + 2))?;
        edges.push(edge);
    }
    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn start() -> NaiveDateTime {
        crate::models::parse_timestamp("2024-01-01 00:00:00").unwrap()
    }

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_reads_full_layout_with_quoted_fields() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "corpus.csv",
            "url,title,meta_description,body_text,depth,last_crawled,out_links,anchor_texts\n\
             https://a.com/x,A,\"desc, with comma\",\"line one\nline two\",2,2024-05-01 10:00:00,\"['https://b.com/']\",\"['B']\"\n",
        );
        let file = read_corpus(&path, start()).unwrap();
        assert!(!file.legacy);
        assert_eq!(file.rows.len(), 1);
        let row = &file.rows[0];
        assert_eq!(row.meta_description.as_deref(), Some("desc, with comma"));
        assert_eq!(row.body_text.as_deref(), Some("line one\nline two"));
        assert_eq!(row.depth.as_deref(), Some("2"));
        assert_eq!(row.out_links.as_deref(), Some("['https://b.com/']"));
    }

    #[test]
    fn test_backslash_escaped_quote() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "corpus.csv",
            "url,title,meta_description,body_text,depth,last_crawled,out_links,anchor_texts\n\
             https://a.com/x,\"Say \\\"hi\\\"\",,body,1,2024-05-01,,\n",
        );
        let file = read_corpus(&path, start()).unwrap();
        assert_eq!(file.rows[0].title.as_deref(), Some("Say \"hi\""));
        assert_eq!(file.rows[0].meta_description, None);
    }

    #[test]
    fn test_legacy_layout_gets_depth_and_synthetic_times() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "legacy.csv",
            "url,title,meta_description,body_text,out_links,anchor_texts\n\
             https://a.com/1,One,,first,,\n\
             https://a.com/2,Two,,second,,\n",
        );
        let file = read_corpus(&path, start()).unwrap();
        assert!(file.legacy);
        assert_eq!(file.rows[0].depth.as_deref(), Some("1"));
        assert_eq!(
            file.rows[0].last_crawled.as_deref(),
            Some("2024-01-01 00:00:00")
        );
        assert_eq!(
            file.rows[1].last_crawled.as_deref(),
            Some("2024-01-01 00:00:01")
        );
    }

    #[test]
    fn test_missing_url_column_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "bad.csv", "title,body_text\nA,b\n");
        let err = read_corpus(&path, start()).unwrap_err();
        assert!(err.to_string().contains("no 'url' column"));
    }

    #[test]
    fn test_edges_written_and_read_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("graph/web_graph.csv");
        let n = write_edges(
            &path,
            vec![
                ("https://a.com/", "https://b.com/", "B, the site"),
                ("https://b.com/", "https://a.com/", ""),
            ],
        )
        .unwrap();
        assert_eq!(n, 2);
        let edges = read_edges(&path).unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].anchor, "B, the site");
        assert_eq!(edges[1].destination, "https://a.com/");
    }

    #[test]
    fn test_empty_edge_file_has_header() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.csv");
        write_edges(&path, Vec::new()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "source,destination,anchor");
        assert!(read_edges(&path).unwrap().is_empty());
    }
}
