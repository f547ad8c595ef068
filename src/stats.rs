//! Corpus, index and graph overview for `hrank stats`.
//!
//! Reads the stored corpus and the current snapshot; no scores are computed.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::graph::LinkGraph;
use crate::index::snapshot::SnapshotStore;
use crate::store;

/// Run the stats command and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let corpus = store::load_corpus(&pool).await?;
    let last_ingest = store::last_ingest_at(&pool).await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Hybrid Rank Stats");
    println!("=================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!("  Documents:    {}", corpus.len());
    println!(
        "  Last ingest:  {}",
        last_ingest
            .as_deref()
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );

    let snapshots = SnapshotStore::new(&config.index.dir, config.index.keep_generations);
    println!();
    println!("  Index:        {}", config.index.dir.display());
    match snapshots.load_current()? {
        Some(snapshot) => {
            let m = &snapshot.manifest;
            println!("  Generation:   {}", m.generation);
            println!("  Model:        {} ({} dims)", m.model, m.dims);
            println!("  Indexed:      {} / {}", m.count, corpus.len());
            println!("  Built:        {}", format_ts_relative(&m.created_at));
            let generations = snapshots.list_generations()?;
            println!("  On disk:      {} generation(s)", generations.len());
        }
        None => println!("  Generation:   none (run `hrank reindex`)"),
    }

    let stats = LinkGraph::build(&corpus).stats();
    println!();
    println!(
        "  Graph nodes:  {} ({} crawled, {} external)",
        stats.nodes, stats.crawled_nodes, stats.external_nodes
    );
    println!("  Graph edges:  {}", stats.edges);
    println!("  Dangling:     {}", stats.dangling_nodes);
    if let Some((url, degree)) = stats.max_in_degree {
        println!("  Most linked:  {} ({} in-links)", url, degree);
    }
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format an RFC 3339 timestamp relative to now ("3 hours ago").
fn format_ts_relative(ts: &str) -> String {
    let parsed = match chrono::DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => dt.with_timezone(&chrono::Utc),
        Err(_) => return ts.to_string(),
    };
    let delta = (chrono::Utc::now() - parsed).num_seconds();

    if delta < 0 {
        parsed.format("%Y-%m-%d %H:%M").to_string()
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        parsed.format("%Y-%m-%d %H:%M").to_string()
    }
}
