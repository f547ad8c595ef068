//! # Hybrid Rank
//!
//! A small web search engine that ranks crawled pages by fusing dense
//! embedding similarity with link authority (PageRank and HITS).
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Crawl CSVs │──▶│ Corpus Store│──▶│  Embedding   │
//! │            │   │  (SQLite)   │   │ Index (snap) │
//! └────────────┘   └──────┬──────┘   └──────┬───────┘
//!                         │                 │
//!                         ▼                 ▼
//!                  ┌────────────┐    ┌────────────┐
//!                  │ Link Graph │──▶ │   Fusion   │──▶ CLI / HTTP
//!                  │ PR + HITS  │    │   Engine   │
//!                  └────────────┘    └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hrank init
//! hrank ingest crawl.csv
//! hrank reindex
//! hrank search "africa politics" --mode hybrid
//! hrank serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`error`] | Typed engine errors with stable codes |
//! | [`tabular`] | Crawler CSV and edge-list files |
//! | [`links`] | Parsing of stringified link lists |
//! | [`corpus`] | Validation and deduplication of crawled rows |
//! | [`store`] | SQLite persistence of the corpus |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Versioned embedding snapshots and exact vector search |
//! | [`graph`] | Link graph, PageRank and HITS |
//! | [`fusion`] | Score normalization, fusion and description backfill |
//! | [`engine`] | Query façade over a loaded snapshot |
//! | [`server`] | HTTP query API |

pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod get;
pub mod graph;
pub mod graph_cmd;
pub mod index;
pub mod index_cmd;
pub mod ingest;
pub mod links;
pub mod migrate;
pub mod models;
pub mod search;
pub mod server;
pub mod stats;
pub mod store;
pub mod tabular;
