//! `hrank search` and `hrank top`: command-line front ends over [`Engine`].

use anyhow::Result;

use crate::config::Config;
use crate::engine::{Engine, GraphScope, RankBy, SearchMode};
use crate::error::EngineError;

/// Options for one command-line search.
#[derive(Debug, Clone, Default)]
pub struct SearchArgs {
    pub mode: String,
    pub scope: String,
    pub profile: Option<String>,
    pub top_k: Option<usize>,
}

pub async fn run_search(config: &Config, query: &str, args: &SearchArgs) -> Result<()> {
    let mode: SearchMode = args.mode.parse()?;
    let scope: GraphScope = args.scope.parse()?;

    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let engine = Engine::open(config.clone()).await?;
    let params = engine.params(mode, scope, args.top_k, args.profile.as_deref())?;
    let response = engine.search(query, &params).await?;

    if !response.index_ready {
        let err = EngineError::IndexNotReady;
        println!("No results ({}: {}).", err.code(), err);
        return Ok(());
    }
    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in response.results.iter().enumerate() {
        println!(
            "{}. [{:.4}] {}",
            i + 1,
            result.score,
            result.title.as_deref().unwrap_or("(untitled)")
        );
        println!("    url: {}", result.url);
        println!("    similarity: {:.4}", result.similarity);
        if let Some(pr) = result.pagerank {
            println!("    pagerank: {:.4}", pr);
        }
        if let Some(auth) = result.authority {
            println!("    authority: {:.4}", auth);
        }
        println!(
            "    description: \"{}\"",
            result.meta_description.replace('\n', " ").trim()
        );
        println!();
    }
    Ok(())
}

/// Print the highest-scoring crawled documents for a global ranking.
pub async fn run_top(config: &Config, by: &str, limit: usize) -> Result<()> {
    let by: RankBy = by.parse()?;
    let engine = Engine::open(config.clone()).await?;
    let entries = engine.top_by(by, limit);

    if entries.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, entry) in entries.iter().enumerate() {
        let title = entry.title.as_deref().unwrap_or("(untitled)");
        println!("{}. [{:.6}] {}", i + 1, entry.score, title);
        println!("    url: {}", entry.url);
        println!(
            "    description: \"{}\"",
            entry.meta_description.replace('\n', " ").trim()
        );
    }
    Ok(())
}
