//! `hrank reindex`: bring the embedding snapshot in line with the stored
//! corpus.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::index::{self, ReindexReport};
use crate::store;

/// Reindex the stored corpus and print the report.
pub async fn run_reindex(config: &Config, full: bool, dry_run: bool) -> Result<()> {
    let report = reindex_stored(config, full, dry_run).await?;

    if dry_run {
        println!("reindex (dry-run)");
    } else {
        println!("reindex");
    }
    print_report(&report);
    println!("ok");
    Ok(())
}

/// Load the corpus from the database and reindex it.
pub async fn reindex_stored(config: &Config, full: bool, dry_run: bool) -> Result<ReindexReport> {
    if !config.embedding.is_enabled() {
        bail!("Reindex requires embeddings. Set [embedding] provider in config.");
    }

    let pool = db::connect(config).await?;
    let corpus = store::load_corpus(&pool).await?;
    pool.close().await;

    let provider = embedding::create_provider(&config.embedding)?;
    tracing::info!(
        documents = corpus.len(),
        model = provider.model_name(),
        dims = provider.dims(),
        full,
        "reindexing"
    );
    let report = index::reindex(config, provider.as_ref(), &corpus, full, dry_run).await?;
    if let Some(generation) = report.generation {
        tracing::info!(generation, dirty = report.dirty, "snapshot committed");
    }
    Ok(report)
}

fn print_report(report: &ReindexReport) {
    println!("  documents: {}", report.total);
    println!("  dirty: {}", report.dirty);
    println!("  reused: {}", report.reused);
    println!("  pruned: {}", report.pruned);
    if report.model_changed {
        println!("  model changed: yes");
    }
    match report.generation {
        Some(generation) => println!("  generation: {}", generation),
        None => println!("  generation: unchanged"),
    }
}
