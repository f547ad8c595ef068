//! Error kinds surfaced by the ranking engine.
//!
//! Application plumbing uses `anyhow`; these typed kinds mark the failures
//! callers are expected to branch on. Each kind has a stable machine-readable
//! [`code`](EngineError::code) that the HTTP layer puts in error bodies.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A corpus row was malformed or missing a required field. The row is
    /// skipped; the rest of the batch continues.
    #[error("row {row}: {reason}")]
    Ingestion { row: usize, reason: String },

    /// A query arrived before any reindex was committed.
    #[error("no index snapshot has been committed yet; run `hrank reindex`")]
    IndexNotReady,

    /// The link graph has no edges; link scores degrade to uniform values.
    #[error("link graph has {nodes} nodes and no edges")]
    GraphEmpty { nodes: usize },

    /// Reading or writing an index snapshot failed.
    #[error("snapshot {path}: {message}")]
    Persistence { path: PathBuf, message: String },
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Ingestion { .. } => "ingestion_error",
            EngineError::IndexNotReady => "index_not_ready",
            EngineError::GraphEmpty { .. } => "graph_empty",
            EngineError::Persistence { .. } => "persistence_error",
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        EngineError::Persistence {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
