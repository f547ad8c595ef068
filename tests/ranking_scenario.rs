//! Whole-pipeline ranking scenarios run through the library API with the
//! offline hash embedder.

use tempfile::TempDir;

use hybrid_rank::config::Config;
use hybrid_rank::corpus::load;
use hybrid_rank::embedding::create_provider;
use hybrid_rank::engine::{Engine, GraphScope, RankBy, SearchMode};
use hybrid_rank::index::{self, SemanticIndex};
use hybrid_rank::models::CorpusRow;

const VOCAB: [&str; 20] = [
    "river", "mountain", "bread", "music", "engine", "garden", "ocean", "market", "football",
    "science", "history", "winter", "coffee", "library", "train", "forest", "camera", "silver",
    "planet", "harbor",
];
const BOTH: [usize; 5] = [7, 23, 41, 66, 88];
const AFRICA_ONLY: [usize; 2] = [3, 50];
const POLITICS_ONLY: [usize; 2] = [12, 77];
const LINKED: usize = 88;

fn url(i: usize) -> String {
    format!("https://site.com/page/{}", i)
}

fn body(i: usize) -> String {
    let filler: Vec<&str> = (0..6).map(|j| VOCAB[(i + 3 * j) % VOCAB.len()]).collect();
    let filler = filler.join(" ");
    if BOTH.contains(&i) {
        format!("africa politics {}", filler)
    } else if AFRICA_ONLY.contains(&i) {
        format!("africa {}", filler)
    } else if POLITICS_ONLY.contains(&i) {
        format!("politics {}", filler)
    } else {
        filler
    }
}

/// 100 pages; every page except one links to page 88.
fn hundred_pages() -> Vec<CorpusRow> {
    (0..100)
        .map(|i| CorpusRow {
            url: Some(url(i)),
            title: Some(format!("Page {}", i)),
            meta_description: Some(if i % 2 == 0 {
                "No Description".to_string()
            } else {
                format!("Item {}", i)
            }),
            body_text: Some(body(i)),
            depth: Some("2".into()),
            last_crawled: Some(format!("2024-01-{:02} 00:00:00", 1 + i % 28)),
            out_links: Some(if i == LINKED {
                "[]".to_string()
            } else {
                format!("['{}']", url(LINKED))
            }),
            anchor_texts: None,
        })
        .collect()
}

async fn engine_over(tmp: &TempDir, rows: Vec<CorpusRow>) -> Engine {
    let config = Config::rooted_at(tmp.path());
    let (corpus, report) = load(rows);
    assert!(report.skipped.is_empty());
    let provider = create_provider(&config.embedding).unwrap();
    index::reindex(&config, provider.as_ref(), &corpus, false, false)
        .await
        .unwrap();
    let index = SemanticIndex::open(&config).unwrap();
    assert!(index.is_some());
    Engine::from_parts(config, corpus, index).unwrap()
}

#[tokio::test]
async fn test_africa_politics_semantic_top_ten() {
    let tmp = TempDir::new().unwrap();
    let engine = engine_over(&tmp, hundred_pages()).await;

    let params = engine
        .params(SearchMode::Semantic, GraphScope::Global, Some(10), None)
        .unwrap();
    let response = engine.search("Africa Politics", &params).await.unwrap();
    assert!(response.index_ready);
    assert_eq!(response.results.len(), 10);

    let urls: Vec<&str> = response.results.iter().map(|r| r.url.as_str()).collect();
    let both: Vec<String> = BOTH.iter().map(|&i| url(i)).collect();
    for u in &both {
        assert!(urls.contains(&u.as_str()), "{} missing from {:?}", u, urls);
    }

    // Every page with both words outranks every page with neither.
    let last_both = urls
        .iter()
        .rposition(|u| both.iter().any(|b| b == u))
        .unwrap();
    let neither = |u: &str| {
        !both.iter().any(|b| b == u)
            && !AFRICA_ONLY.iter().chain(&POLITICS_ONLY).any(|&i| url(i) == u)
    };
    let first_neither = urls.iter().position(|u| neither(u)).unwrap_or(urls.len());
    assert!(last_both < first_neither, "{:?}", urls);
    assert_eq!(last_both, 4);

    for r in &response.results {
        assert!(r.pagerank.is_none());
        assert!(r.authority.is_none());
    }
}

#[tokio::test]
async fn test_hybrid_promotes_linked_page() {
    let tmp = TempDir::new().unwrap();
    let engine = engine_over(&tmp, hundred_pages()).await;

    let params = engine
        .params(
            SearchMode::Hybrid,
            GraphScope::Global,
            Some(10),
            Some("link-pagerank"),
        )
        .unwrap();
    let response = engine.search("Africa Politics", &params).await.unwrap();
    let top = &response.results[0];
    assert_eq!(top.url, url(LINKED));
    assert_eq!(top.pagerank, Some(1.0));

    // Even pages carry "No Description"; the body stands in for it.
    assert_eq!(top.meta_description, body(LINKED));

    let pr = engine.top_by(RankBy::PageRank, 1);
    assert_eq!(pr[0].url, url(LINKED));
    assert_eq!(pr[0].meta_description, body(LINKED));
}

#[tokio::test]
async fn test_reindex_twice_keeps_hashes() {
    let tmp = TempDir::new().unwrap();
    let config = Config::rooted_at(tmp.path());
    let (corpus, _) = load(hundred_pages());
    let provider = create_provider(&config.embedding).unwrap();

    let first = index::reindex(&config, provider.as_ref(), &corpus, false, false)
        .await
        .unwrap();
    assert_eq!(first.dirty, 100);
    let before = SemanticIndex::open(&config).unwrap().unwrap();

    let second = index::reindex(&config, provider.as_ref(), &corpus, false, false)
        .await
        .unwrap();
    assert_eq!(second.dirty, 0);
    assert_eq!(second.generation, None);
    let after = SemanticIndex::open(&config).unwrap().unwrap();
    assert_eq!(before.snapshot().hashes, after.snapshot().hashes);
    assert_eq!(after.manifest().generation, 1);
}

#[tokio::test]
async fn test_three_cycle_has_uniform_pagerank() {
    let tmp = TempDir::new().unwrap();
    let page = |from: &str, to: &str| CorpusRow {
        url: Some(from.into()),
        title: None,
        meta_description: None,
        body_text: Some("cycle".into()),
        depth: None,
        last_crawled: Some("2024-01-01".into()),
        out_links: Some(format!("['{}']", to)),
        anchor_texts: None,
    };
    let engine = engine_over(
        &tmp,
        vec![
            page("https://a.com/", "https://b.com/"),
            page("https://b.com/", "https://c.com/"),
            page("https://c.com/", "https://a.com/"),
        ],
    )
    .await;

    let top = engine.top_by(RankBy::PageRank, 10);
    assert_eq!(top.len(), 3);
    for entry in &top {
        assert!((entry.score - 1.0 / 3.0).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_no_description_backfills_thirty_tokens() {
    let tmp = TempDir::new().unwrap();
    let words: Vec<String> = (1..=45).map(|i| format!("token{}", i)).collect();
    let row = CorpusRow {
        url: Some("https://long.com/".into()),
        title: Some("Long".into()),
        meta_description: Some("No Description".into()),
        body_text: Some(words.join(" ")),
        depth: Some("1".into()),
        last_crawled: Some("2024-01-01".into()),
        out_links: None,
        anchor_texts: None,
    };
    let engine = engine_over(&tmp, vec![row]).await;
    let params = engine
        .params(SearchMode::Semantic, GraphScope::Global, None, None)
        .unwrap();
    let response = engine.search("token1", &params).await.unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].meta_description, words[..30].join(" "));
}
