//! Query façade.
//!
//! An [`Engine`] owns one immutable view of the system: the stored corpus,
//! the link graph built from it with its global scores, and the committed
//! index snapshot. A search runs:
//!
//! 1. embed the query and retrieve the top-k semantic candidates,
//! 2. look up link scores, globally or on the subgraph induced by the
//!    candidates,
//! 3. normalize and fuse them under the mode's weights,
//! 4. backfill descriptions and shape [`RankedResult`]s.
//!
//! Searching never mutates the engine. Reindexing produces a new snapshot;
//! callers pick it up by opening a new engine.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::config::{Config, FusionWeights};
use crate::corpus::Corpus;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::EngineError;
use crate::fusion::{self, Candidate};
use crate::graph::{GraphScores, LinkGraph};
use crate::index::SemanticIndex;
use crate::migrate;
use crate::models::RankedResult;
use crate::store;

/// How candidates are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Cosine similarity only.
    Semantic,
    /// PageRank only, over the semantic candidates.
    PageRank,
    /// HITS authority only, over the semantic candidates.
    Hits,
    /// Weighted profile.
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Semantic => "semantic",
            SearchMode::PageRank => "pagerank",
            SearchMode::Hits => "hits",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl FromStr for SearchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "semantic" | "vector" => Ok(SearchMode::Semantic),
            "pagerank" => Ok(SearchMode::PageRank),
            "hits" => Ok(SearchMode::Hits),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => bail!(
                "Unknown search mode: {}. Use semantic, pagerank, hits, or hybrid.",
                other
            ),
        }
    }
}

/// Where link scores come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphScope {
    /// Scores computed once over the whole graph.
    #[default]
    Global,
    /// Scores recomputed on the subgraph induced by the candidates.
    Query,
}

impl FromStr for GraphScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "global" => Ok(GraphScope::Global),
            "query" => Ok(GraphScope::Query),
            other => bail!("Unknown graph scope: {}. Use global or query.", other),
        }
    }
}

/// Which global score `top` ranks by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankBy {
    PageRank,
    Authority,
    Hub,
}

impl FromStr for RankBy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pagerank" => Ok(RankBy::PageRank),
            "authority" => Ok(RankBy::Authority),
            "hub" => Ok(RankBy::Hub),
            other => bail!("Unknown ranking: {}. Use pagerank, authority, or hub.", other),
        }
    }
}

/// Validated search parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub mode: SearchMode,
    pub scope: GraphScope,
    pub top_k: usize,
    pub weights: FusionWeights,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub results: Vec<RankedResult>,
    /// False when no index snapshot has been committed; `results` is empty.
    pub index_ready: bool,
}

/// One entry of a query-independent ranking.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TopEntry {
    pub url: String,
    pub title: Option<String>,
    /// Stored description, or the start of the body when it has none.
    pub meta_description: String,
    pub score: f64,
}

/// Min-max normalized copies of the global scores.
#[derive(Debug, Clone, Default)]
struct NormalizedScores {
    pagerank: HashMap<String, f64>,
    authority: HashMap<String, f64>,
}

pub struct Engine {
    config: Config,
    provider: Box<dyn EmbeddingProvider>,
    corpus: Arc<Corpus>,
    index: Option<SemanticIndex>,
    graph: LinkGraph,
    global: GraphScores,
    global_norm: NormalizedScores,
}

impl Engine {
    /// Open the engine over the stored corpus and the committed snapshot.
    ///
    /// Global graph scores are computed on a blocking thread while the
    /// snapshot is read.
    pub async fn open(config: Config) -> Result<Self> {
        migrate::run_migrations(&config).await?;
        let pool = db::connect(&config).await?;
        let corpus = Arc::new(store::load_corpus(&pool).await?);
        pool.close().await;

        let graph_corpus = Arc::clone(&corpus);
        let graph_config = config.graph.clone();
        let graph_task = tokio::task::spawn_blocking(move || {
            let graph = LinkGraph::build(&graph_corpus);
            let scores = GraphScores::compute(&graph, &graph_config);
            (graph, scores)
        });
        let index_config = config.clone();
        let index_task = tokio::task::spawn_blocking(move || SemanticIndex::open(&index_config));

        let (graph_res, index_res) = tokio::join!(graph_task, index_task);
        let (graph, global) = graph_res.context("graph scoring task failed")?;
        let index = index_res.context("snapshot loading task failed")??;

        Self::assemble(config, corpus, index, graph, global)
    }

    /// Build an engine from parts already in memory.
    pub fn from_parts(config: Config, corpus: Corpus, index: Option<SemanticIndex>) -> Result<Self> {
        let graph = LinkGraph::build(&corpus);
        let global = GraphScores::compute(&graph, &config.graph);
        Self::assemble(config, Arc::new(corpus), index, graph, global)
    }

    fn assemble(
        config: Config,
        corpus: Arc<Corpus>,
        index: Option<SemanticIndex>,
        graph: LinkGraph,
        global: GraphScores,
    ) -> Result<Self> {
        let provider =
            embedding::restore_provider(&config.embedding, index.as_ref().and_then(|i| i.vocabulary()))?;
        let global_norm = NormalizedScores {
            pagerank: fusion::normalize(&global.pagerank),
            authority: fusion::normalize(&global.authority),
        };
        match &index {
            Some(i) => tracing::info!(
                generation = i.manifest().generation,
                documents = i.len(),
                nodes = graph.node_count(),
                edges = graph.edge_count(),
                "engine ready"
            ),
            None => tracing::warn!(code = EngineError::IndexNotReady.code(), "{}", EngineError::IndexNotReady),
        }
        Ok(Self {
            config,
            provider,
            corpus,
            index,
            graph,
            global,
            global_norm,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn index(&self) -> Option<&SemanticIndex> {
        self.index.as_ref()
    }

    pub fn graph(&self) -> &LinkGraph {
        &self.graph
    }

    pub fn global_scores(&self) -> &GraphScores {
        &self.global
    }

    /// Validate caller-supplied parameters against the configuration.
    pub fn params(
        &self,
        mode: SearchMode,
        scope: GraphScope,
        top_k: Option<usize>,
        profile: Option<&str>,
    ) -> Result<SearchParams> {
        let top_k = top_k.unwrap_or(self.config.retrieval.top_k);
        if top_k == 0 || top_k > self.config.retrieval.max_top_k {
            bail!(
                "top_k must be between 1 and {}",
                self.config.retrieval.max_top_k
            );
        }
        let weights = match mode {
            SearchMode::Semantic => FusionWeights::new(1.0, 0.0, 0.0),
            SearchMode::PageRank => FusionWeights::new(0.0, 0.0, 1.0),
            SearchMode::Hits => FusionWeights::new(0.0, 1.0, 0.0),
            SearchMode::Hybrid => self.config.ranking.profile(profile)?,
        };
        Ok(SearchParams {
            mode,
            scope,
            top_k,
            weights,
        })
    }

    /// Run one query.
    pub async fn search(&self, query: &str, params: &SearchParams) -> Result<SearchResponse> {
        let index = match &self.index {
            Some(i) => i,
            None => {
                return Ok(SearchResponse {
                    results: Vec::new(),
                    index_ready: false,
                })
            }
        };
        if query.trim().is_empty() {
            return Ok(SearchResponse {
                results: Vec::new(),
                index_ready: true,
            });
        }
        if !self.config.embedding.is_enabled() {
            bail!("Search requires embeddings. Set [embedding] provider in config.");
        }
        let manifest = index.manifest();
        if manifest.model != self.provider.model_name() || manifest.dims != self.provider.dims() {
            bail!(
                "Index was built with {} ({} dims) but {} ({} dims) is configured; run `hrank reindex`",
                manifest.model,
                manifest.dims,
                self.provider.model_name(),
                self.provider.dims()
            );
        }

        let query_vec =
            embedding::embed_query(self.provider.as_ref(), &self.config.embedding, query).await?;
        let hits = index.search(&query_vec, params.top_k);
        let candidates: Vec<Candidate> = hits
            .iter()
            .map(|h| Candidate {
                url: h.url.clone(),
                similarity: h.similarity,
            })
            .collect();

        let fused = match params.scope {
            GraphScope::Global => fusion::fuse(
                &candidates,
                &self.global_norm.pagerank,
                &self.global_norm.authority,
                params.weights,
                self.config.ranking.normalize_similarity,
            ),
            GraphScope::Query => {
                let sub = self
                    .graph
                    .subgraph(candidates.iter().map(|c| c.url.as_str()));
                let scores = GraphScores::compute(&sub, &self.config.graph);
                fusion::fuse(
                    &candidates,
                    &fusion::normalize(&scores.pagerank),
                    &fusion::normalize(&scores.authority),
                    params.weights,
                    self.config.ranking.normalize_similarity,
                )
            }
        };

        let positions: HashMap<&str, usize> =
            hits.iter().map(|h| (h.url.as_str(), h.position)).collect();
        let uses_pagerank = matches!(params.mode, SearchMode::PageRank | SearchMode::Hybrid);
        let uses_authority = matches!(params.mode, SearchMode::Hits | SearchMode::Hybrid);

        let results = fused
            .into_iter()
            .filter_map(|f| {
                let meta = positions
                    .get(f.url.as_str())
                    .and_then(|&p| index.metadata(p))?;
                Some(RankedResult {
                    title: meta.title.clone(),
                    meta_description: fusion::backfill_description(
                        meta.meta_description.as_deref(),
                        &meta.body_text,
                        self.config.retrieval.description_tokens,
                    ),
                    score: f.score,
                    similarity: f.similarity,
                    pagerank: uses_pagerank.then_some(f.pagerank),
                    authority: uses_authority.then_some(f.authority),
                    url: f.url,
                })
            })
            .collect();

        Ok(SearchResponse {
            results,
            index_ready: true,
        })
    }

    /// Query-independent ranking of crawled documents by a global score.
    ///
    /// Link-only destinations that were never crawled are skipped. Ties keep
    /// graph insertion order.
    pub fn top_by(&self, by: RankBy, limit: usize) -> Vec<TopEntry> {
        let scores = match by {
            RankBy::PageRank => &self.global.pagerank,
            RankBy::Authority => &self.global.authority,
            RankBy::Hub => &self.global.hub,
        };
        let mut entries: Vec<TopEntry> = self
            .graph
            .nodes()
            .iter()
            .filter_map(|url| {
                let doc = self.corpus.get(url)?;
                Some(TopEntry {
                    url: url.clone(),
                    title: doc.title.clone(),
                    meta_description: fusion::backfill_description(
                        doc.meta_description.as_deref(),
                        &doc.body_text,
                        self.config.retrieval.description_tokens,
                    ),
                    score: scores.get(url).copied().unwrap_or(0.0),
                })
            })
            .collect();
        entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        entries.truncate(limit);
        entries
    }
}
