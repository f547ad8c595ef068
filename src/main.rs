//! # Hybrid Rank CLI (`hrank`)
//!
//! The `hrank` binary drives the whole pipeline: loading crawler output into
//! the corpus store, building the embedding index, querying it with graph
//! authority fused in, and serving the query API over HTTP.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hrank init` | Create the SQLite database and run schema migrations |
//! | `hrank ingest <csv>...` | Load crawler CSV files into the corpus store |
//! | `hrank reindex` | Embed new or changed documents and commit a snapshot |
//! | `hrank search "<query>"` | Ranked search (`--mode vector\|pagerank\|hits\|hybrid`) |
//! | `hrank top` | Query-independent ranking by PageRank, authority or hub score |
//! | `hrank graph export <path>` | Write the link graph as a CSV edge list |
//! | `hrank graph stats` | Print link graph structure |
//! | `hrank stats` | Corpus, index and graph overview |
//! | `hrank get <url>` | Print one stored document |
//! | `hrank serve` | Start the HTTP query API |
//!
//! ## Examples
//!
//! ```bash
//! hrank init --config ./config/hrank.toml
//! hrank ingest crawl-2024-01.csv crawl-2024-02.csv
//! hrank reindex
//! hrank search "africa politics" --mode hybrid --profile link-authority
//! hrank serve
//! ```
//!
//! Diagnostics go to stderr through `tracing`; set `RUST_LOG=debug` for more.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hybrid_rank::search::SearchArgs;
use hybrid_rank::{config, get, graph_cmd, index_cmd, ingest, migrate, search, server, stats};

/// Hybrid Rank: a small web search engine that fuses dense-embedding
/// similarity with PageRank and HITS link authority.
#[derive(Parser)]
#[command(
    name = "hrank",
    about = "Hybrid Rank: semantic search fused with link authority",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hrank.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Load crawler CSV files into the corpus store.
    ///
    /// Rows are merged with the stored corpus and deduplicated by URL and
    /// URL key, keeping the earliest crawl.
    Ingest {
        /// One or more corpus CSV files.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Discard the stored corpus before loading.
        #[arg(long)]
        rebuild: bool,
    },

    /// Embed new or changed documents and commit a new index snapshot.
    Reindex {
        /// Re-embed every document, ignoring stored hashes.
        #[arg(long)]
        full: bool,

        /// Report what would be embedded without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search the index.
    Search {
        /// The search query string.
        query: String,

        /// Ranking mode: `vector`, `pagerank`, `hits`, or `hybrid`.
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Where graph scores come from: `global` or `query` (candidate subgraph).
        #[arg(long, default_value = "global")]
        scope: String,

        /// Weight profile for hybrid mode (see `[ranking.profiles]`).
        #[arg(long)]
        profile: Option<String>,

        /// Number of results.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Rank all graph nodes by a global link score.
    Top {
        /// `pagerank`, `authority`, or `hub`.
        #[arg(long, default_value = "pagerank")]
        by: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Link graph tools.
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },

    /// Show corpus, index and graph statistics.
    Stats,

    /// Print a stored document by URL.
    Get { url: String },

    /// Start the HTTP query API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum GraphAction {
    /// Write the link graph as a `source,destination,anchor` CSV.
    Export { path: PathBuf },
    /// Print node, edge and degree statistics.
    Stats {
        /// Read an exported edge file instead of the stored corpus.
        #[arg(long)]
        edges: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { files, rebuild } => {
            ingest::run_ingest(&cfg, &files, rebuild).await?;
        }
        Commands::Reindex { full, dry_run } => {
            index_cmd::run_reindex(&cfg, full, dry_run).await?;
        }
        Commands::Search {
            query,
            mode,
            scope,
            profile,
            top_k,
        } => {
            let args = SearchArgs {
                mode,
                scope,
                profile,
                top_k,
            };
            search::run_search(&cfg, &query, &args).await?;
        }
        Commands::Top { by, limit } => {
            search::run_top(&cfg, &by, limit).await?;
        }
        Commands::Graph { action } => match action {
            GraphAction::Export { path } => graph_cmd::run_export(&cfg, &path).await?,
            GraphAction::Stats { edges } => graph_cmd::run_stats(&cfg, edges.as_deref()).await?,
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Get { url } => {
            get::run_get(&cfg, &url).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
