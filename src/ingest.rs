//! Corpus ingestion.
//!
//! Reads crawler CSV files, merges them with the stored corpus and re-runs
//! the deduplicating [`load`] pass over the union, so the stored table always
//! satisfies the corpus invariants. Rows that fail validation are reported and
//! skipped; the batch continues.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;

use crate::config::Config;
use crate::corpus::{load, Corpus, LoadReport};
use crate::db;
use crate::models::CorpusRow;
use crate::store;
use crate::tabular;

/// Outcome of one ingest run.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub files: usize,
    pub stored_before: usize,
    pub rows_read: usize,
    pub unreadable_rows: usize,
    pub legacy_files: usize,
    pub report: LoadReport,
}

/// Merge `files` into the stored corpus and write the result back.
///
/// With `rebuild` the stored corpus is discarded first.
pub async fn ingest_files(
    config: &Config,
    files: &[PathBuf],
    rebuild: bool,
) -> Result<(Corpus, IngestSummary)> {
    let pool = db::connect(config).await?;
    let started = Utc::now().naive_utc();

    let stored = if rebuild {
        Corpus::new()
    } else {
        store::load_corpus(&pool).await?
    };

    let mut summary = IngestSummary {
        files: files.len(),
        stored_before: stored.len(),
        ..IngestSummary::default()
    };

    // Stored documents go first: on equal crawl times the stable sort keeps
    // them ahead of re-crawled copies.
    let mut rows: Vec<CorpusRow> = stored.documents().iter().map(CorpusRow::from).collect();
    for path in files {
        let file = tabular::read_corpus(path, started)?;
        tracing::info!(
            file = %path.display(),
            rows = file.rows.len(),
            skipped = file.skipped.len(),
            "read corpus file"
        );
        summary.rows_read += file.rows.len();
        summary.unreadable_rows += file.skipped.len();
        if file.legacy {
            summary.legacy_files += 1;
        }
        rows.extend(file.rows);
    }

    let (corpus, report) = load(rows);
    store::replace_corpus(&pool, &corpus).await?;

    let names: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
    store::record_ingest_run(&pool, &names, report.input_rows, report.unique_documents).await?;

    summary.report = report;
    pool.close().await;
    Ok((corpus, summary))
}

/// CLI entry point for `hrank ingest`.
pub async fn run_ingest(config: &Config, files: &[PathBuf], rebuild: bool) -> Result<()> {
    if files.is_empty() {
        anyhow::bail!("No corpus files given. Usage: hrank ingest <file.csv>...");
    }

    let (_, summary) = ingest_files(config, files, rebuild).await?;
    let report = &summary.report;

    println!("ingest{}", if rebuild { " (rebuild)" } else { "" });
    println!("  files: {}", summary.files);
    if summary.legacy_files > 0 {
        println!("  legacy files: {}", summary.legacy_files);
    }
    println!("  stored before: {}", summary.stored_before);
    println!("  rows read: {}", summary.rows_read);
    println!(
        "  skipped rows: {}",
        summary.unreadable_rows + report.skipped.len()
    );
    println!("  duplicate urls: {}", report.duplicate_urls);
    println!("  duplicate url keys: {}", report.duplicate_keys);
    println!("  unparseable links: {}", report.unparseable_links);
    println!("  unique documents: {}", report.unique_documents);
    println!("ok");

    Ok(())
}
