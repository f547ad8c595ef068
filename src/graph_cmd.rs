//! `hrank graph export` and `hrank graph stats`.

use std::path::Path;

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::graph::{GraphStats, LinkGraph};
use crate::store;
use crate::tabular;

/// Build the link graph over the stored corpus.
pub async fn stored_graph(config: &Config) -> Result<LinkGraph> {
    let pool = db::connect(config).await?;
    let corpus = store::load_corpus(&pool).await?;
    pool.close().await;
    Ok(LinkGraph::build(&corpus))
}

/// Write the stored corpus's edge list to `path`.
pub async fn run_export(config: &Config, path: &Path) -> Result<()> {
    let graph = stored_graph(config).await?;
    let written = tabular::write_edges(path, graph.edge_triples())?;
    tracing::info!(path = %path.display(), edges = written, "exported edge list");

    println!("graph export");
    println!("  path: {}", path.display());
    println!("  nodes: {}", graph.node_count());
    println!("  edges: {}", written);
    println!("ok");
    Ok(())
}

/// Print structure statistics, either for the stored corpus or for an
/// edge file written by `graph export`.
pub async fn run_stats(config: &Config, edges: Option<&Path>) -> Result<()> {
    let graph = match edges {
        Some(path) => LinkGraph::from_edges(&tabular::read_edges(path)?),
        None => stored_graph(config).await?,
    };

    println!("graph stats");
    print_stats(&graph.stats());
    println!("ok");
    Ok(())
}

fn print_stats(stats: &GraphStats) {
    println!("  nodes: {}", stats.nodes);
    println!("  edges: {}", stats.edges);
    println!("  crawled: {}", stats.crawled_nodes);
    println!("  external: {}", stats.external_nodes);
    println!("  dangling: {}", stats.dangling_nodes);
    if let Some((url, degree)) = &stats.max_in_degree {
        println!("  max in-degree: {} ({})", degree, url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::load;
    use crate::migrate;
    use crate::models::CorpusRow;
    use tempfile::TempDir;

    fn page(url: &str, links: &str) -> CorpusRow {
        CorpusRow {
            url: Some(url.into()),
            title: None,
            meta_description: None,
            body_text: Some("body".into()),
            depth: None,
            last_crawled: Some("2024-01-01".into()),
            out_links: Some(links.into()),
            anchor_texts: None,
        }
    }

    #[tokio::test]
    async fn test_export_round_trips_through_edge_file() {
        let tmp = TempDir::new().unwrap();
        let config = Config::rooted_at(tmp.path());
        migrate::run_migrations(&config).await.unwrap();
        let pool = db::connect(&config).await.unwrap();
        let (corpus, _) = load(vec![
            page("https://a.com/", "['https://b.com/', 'https://c.com/']"),
            page("https://b.com/", "['https://a.com/']"),
        ]);
        store::replace_corpus(&pool, &corpus).await.unwrap();
        pool.close().await;

        let path = tmp.path().join("out/edges.csv");
        run_export(&config, &path).await.unwrap();

        let stored = stored_graph(&config).await.unwrap();
        let rebuilt = LinkGraph::from_edges(&tabular::read_edges(&path).unwrap());
        assert_eq!(rebuilt.edge_count(), 3);
        assert_eq!(rebuilt.stats(), stored.stats());
    }
}
