//! Document retrieval by URL.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::models::Document;
use crate::store;

pub async fn get_document(config: &Config, url: &str) -> Result<Document> {
    let pool = db::connect(config).await?;
    let doc = store::find_document(&pool, url).await?;
    pool.close().await;

    match doc {
        Some(d) => Ok(d),
        None => bail!("document not found: {}", url),
    }
}

/// CLI entry point for `hrank get`.
pub async fn run_get(config: &Config, url: &str) -> Result<()> {
    let doc = get_document(config, url).await?;

    println!("--- Document ---");
    println!("url:          {}", doc.url);
    println!(
        "title:        {}",
        doc.title.as_deref().unwrap_or("(untitled)")
    );
    println!(
        "description:  {}",
        doc.meta_description.as_deref().unwrap_or("(none)")
    );
    println!("depth:        {}", doc.depth);
    if let Some(ts) = doc.last_crawled {
        println!("last_crawled: {}", ts.format("%Y-%m-%dT%H:%M:%S"));
    }
    println!();

    println!("--- Body ---");
    println!("{}", doc.body_text);
    println!();

    println!("--- Out links ({}) ---", doc.out_links.len());
    for (link, anchor) in doc.out_links.iter().zip(&doc.anchor_texts) {
        if anchor.is_empty() {
            println!("{}", link);
        } else {
            println!("{}  [{}]", link, anchor);
        }
    }

    Ok(())
}
