//! Link Graph Model: the directed hyperlink graph between crawled pages and
//! the link-authority scores computed over it.
//!
//! Nodes are URLs appearing as an edge source or destination. Every source
//! is a crawled document; destinations may be external pages known only
//! through links. Self-loops, malformed destinations and repeated
//! `(source, destination)` pairs are dropped at build time (the first anchor
//! text wins).
//!
//! Scores are recomputed from scratch whenever a graph is built; nothing is
//! updated incrementally.

pub mod hits;
pub mod pagerank;

use std::collections::{HashMap, HashSet};

use url::Url;

use crate::config::GraphConfig;
use crate::corpus::Corpus;
use crate::error::EngineError;
use crate::tabular::EdgeRecord;

pub use hits::{hits, HitsScores};
pub use pagerank::pagerank;

/// A directed edge between node indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub anchor: String,
}

/// Simple directed graph over URLs.
#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    edge_set: HashSet<(usize, usize)>,
    /// Nodes that are crawled pages rather than link-only destinations.
    crawled: HashSet<usize>,
}

/// Summary numbers for `hrank graph stats`.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub crawled_nodes: usize,
    pub external_nodes: usize,
    pub dangling_nodes: usize,
    pub max_in_degree: Option<(String, usize)>,
}

fn is_valid_destination(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some(),
        Err(_) => false,
    }
}

impl LinkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from every document's `out_links` and `anchor_texts`.
    pub fn build(corpus: &Corpus) -> Self {
        let mut graph = Self::new();
        let mut dropped = 0usize;
        for doc in corpus.documents() {
            let source = graph.add_node(&doc.url);
            graph.crawled.insert(source);
            for (i, link) in doc.out_links.iter().enumerate() {
                let anchor = doc.anchor_texts.get(i).map(String::as_str).unwrap_or("");
                if !graph.add_edge_from(source, link.trim(), anchor) {
                    dropped += 1;
                }
            }
        }
        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            dropped,
            "built link graph"
        );
        graph
    }

    /// Rebuild a graph from an exported edge list.
    pub fn from_edges(edges: &[EdgeRecord]) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            let source = graph.add_node(edge.source.trim());
            graph.crawled.insert(source);
            graph.add_edge_from(source, edge.destination.trim(), &edge.anchor);
        }
        graph
    }

    fn add_node(&mut self, url: &str) -> usize {
        if let Some(&i) = self.index.get(url) {
            return i;
        }
        let i = self.nodes.len();
        self.nodes.push(url.to_string());
        self.index.insert(url.to_string(), i);
        i
    }

    /// Returns false when the edge was dropped.
    fn add_edge_from(&mut self, source: usize, destination: &str, anchor: &str) -> bool {
        if destination.is_empty() || destination == self.nodes[source] {
            return false;
        }
        if !is_valid_destination(destination) {
            return false;
        }
        let target = self.add_node(destination);
        if !self.edge_set.insert((source, target)) {
            return false;
        }
        self.edges.push(Edge {
            source,
            target,
            anchor: anchor.trim().to_string(),
        });
        true
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn node_index(&self, url: &str) -> Option<usize> {
        self.index.get(url).copied()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges as `(source, destination, anchor)` URL triples, in build order.
    pub fn edge_triples(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.edges.iter().map(|e| {
            (
                self.nodes[e.source].as_str(),
                self.nodes[e.target].as_str(),
                e.anchor.as_str(),
            )
        })
    }

    /// Out-neighbour lists indexed by node.
    pub(crate) fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); self.nodes.len()];
        for e in &self.edges {
            out[e.source].push(e.target);
        }
        out
    }

    /// The subgraph induced on `urls`; URLs not in the graph are ignored.
    pub fn subgraph<'a, I>(&self, urls: I) -> LinkGraph
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut sub = LinkGraph::new();
        for url in urls {
            if let Some(&i) = self.index.get(url) {
                let j = sub.add_node(url);
                if self.crawled.contains(&i) {
                    sub.crawled.insert(j);
                }
            }
        }
        for e in &self.edges {
            let (Some(&s), Some(&t)) = (
                sub.index.get(&self.nodes[e.source]),
                sub.index.get(&self.nodes[e.target]),
            ) else {
                continue;
            };
            sub.edge_set.insert((s, t));
            sub.edges.push(Edge {
                source: s,
                target: t,
                anchor: e.anchor.clone(),
            });
        }
        sub
    }

    pub fn stats(&self) -> GraphStats {
        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut out_degree = vec![0usize; self.nodes.len()];
        for e in &self.edges {
            in_degree[e.target] += 1;
            out_degree[e.source] += 1;
        }
        let max_in_degree = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d > 0)
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(i, d)| (self.nodes[i].clone(), *d));

        GraphStats {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            crawled_nodes: self.crawled.len(),
            external_nodes: self.nodes.len() - self.crawled.len(),
            dangling_nodes: out_degree.iter().filter(|d| **d == 0).count(),
            max_in_degree,
        }
    }
}

/// PageRank and HITS scores for every node of one graph.
#[derive(Debug, Clone, Default)]
pub struct GraphScores {
    pub pagerank: HashMap<String, f64>,
    pub authority: HashMap<String, f64>,
    pub hub: HashMap<String, f64>,
}

impl GraphScores {
    /// Run PageRank and HITS over `graph`.
    ///
    /// A graph with nodes but no edges yields uniform scores and logs a
    /// `graph_empty` warning; an empty graph yields empty maps.
    pub fn compute(graph: &LinkGraph, config: &GraphConfig) -> Self {
        if graph.node_count() > 0 && graph.edge_count() == 0 {
            let err = EngineError::GraphEmpty {
                nodes: graph.node_count(),
            };
            tracing::warn!(code = err.code(), "{}; link scores are uniform", err);
        }
        let pagerank = pagerank(graph, config.damping, config.max_iter, config.tolerance);
        let HitsScores { hubs, authorities } =
            hits(graph, config.hits_max_iter, config.hits_tolerance);
        Self {
            pagerank,
            authority: authorities,
            hub: hubs,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pagerank.is_empty()
    }
}
