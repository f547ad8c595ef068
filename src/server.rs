//! HTTP query API.
//!
//! Serves the ranking engine as JSON over HTTP. The engine is opened once at
//! startup and held behind an `RwLock<Arc<Engine>>`; requests clone the `Arc`
//! and run against an immutable snapshot, and `POST /admin/reload` swaps in a
//! freshly opened engine after a reindex.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version and index generation) |
//! | `POST` | `/search/vector` | Semantic similarity only |
//! | `POST` | `/search/pagerank` | Candidates ordered by global PageRank |
//! | `POST` | `/search/hits` | Candidates ordered by HITS authority |
//! | `POST` | `/search/hybrid` | Weighted fusion with a ranking profile |
//! | `GET`  | `/rank/top` | Query-independent ranking (`?by=pagerank&limit=20`) |
//! | `POST` | `/admin/reload` | Re-open corpus and snapshot |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `index_not_ready` (503, body also carries
//! `results: []`), `persistence_error` (500), `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::engine::{Engine, GraphScope, RankBy, SearchMode, TopEntry};
use crate::error::EngineError;
use crate::models::RankedResult;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<RwLock<Arc<Engine>>>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(RwLock::new(Arc::new(engine))),
        }
    }

    async fn current(&self) -> Arc<Engine> {
        Arc::clone(&*self.engine.read().await)
    }
}

/// Build the router with CORS enabled for all origins.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search/{mode}", post(handle_search))
        .route("/rank/top", get(handle_top))
        .route("/admin/reload", post(handle_reload))
        .layer(cors)
        .with_state(state)
}

/// Open the engine and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let engine = Engine::open(config.clone()).await?;
    let app = router(AppState::new(engine));

    tracing::info!(bind = %bind_addr, "query API listening");
    println!("Query API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<Vec<RankedResult>>,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Index-not-ready still answers with an (empty) result list.
        let results = (self.code == EngineError::IndexNotReady.code()).then(Vec::new);
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
            results,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let status = match err {
            EngineError::IndexNotReady => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Ingestion { .. } | EngineError::GraphEmpty { .. } => {
                StatusCode::BAD_REQUEST
            }
            EngineError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<EngineError>() {
            Ok(engine_err) => engine_err.into(),
            Err(err) => {
                tracing::error!(error = %format!("{:#}", err), "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message: format!("{:#}", err),
                }
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    documents: usize,
    /// Committed index generation; absent before the first reindex.
    generation: Option<u64>,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = state.current().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        documents: engine.corpus().len(),
        generation: engine.index().map(|i| i.manifest().generation),
    })
}

// ============ POST /search/{mode} ============

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponseBody {
    pub mode: String,
    pub results: Vec<RankedResult>,
}

async fn handle_search(
    State(state): State<AppState>,
    Path(mode): Path<String>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponseBody>, AppError> {
    let mode: SearchMode = mode.parse().map_err(|e: anyhow::Error| bad_request(e.to_string()))?;
    let scope: GraphScope = match req.scope.as_deref() {
        Some(s) => s.parse().map_err(|e: anyhow::Error| bad_request(e.to_string()))?,
        None => GraphScope::Global,
    };
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let engine = state.current().await;
    let params = engine
        .params(mode, scope, req.top_k, req.profile.as_deref())
        .map_err(|e| bad_request(e.to_string()))?;
    let response = engine.search(&req.query, &params).await?;
    if !response.index_ready {
        return Err(EngineError::IndexNotReady.into());
    }

    Ok(Json(SearchResponseBody {
        mode: mode.as_str().to_string(),
        results: response.results,
    }))
}

// ============ GET /rank/top ============

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    #[serde(default)]
    pub by: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TopResponse {
    pub by: String,
    pub results: Vec<TopEntry>,
}

async fn handle_top(
    State(state): State<AppState>,
    Query(q): Query<TopQuery>,
) -> Result<Json<TopResponse>, AppError> {
    let by_name = q.by.unwrap_or_else(|| "pagerank".to_string());
    let by: RankBy = by_name
        .parse()
        .map_err(|e: anyhow::Error| bad_request(e.to_string()))?;

    let engine = state.current().await;
    let max = engine.config().retrieval.max_top_k;
    let limit = q.limit.unwrap_or(engine.config().retrieval.top_k);
    if limit == 0 || limit > max {
        return Err(bad_request(format!("limit must be between 1 and {}", max)));
    }

    Ok(Json(TopResponse {
        by: by_name,
        results: engine.top_by(by, limit),
    }))
}

// ============ POST /admin/reload ============

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub documents: usize,
    pub generation: Option<u64>,
}

/// Re-open the corpus and snapshot, then swap the engine.
///
/// In-flight requests finish on the engine they started with. A failed
/// reload leaves the current engine in place.
async fn handle_reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, AppError> {
    let config = state.current().await.config().clone();
    let fresh = Engine::open(config).await?;
    let body = ReloadResponse {
        documents: fresh.corpus().len(),
        generation: fresh.index().map(|i| i.manifest().generation),
    };
    *state.engine.write().await = Arc::new(fresh);
    tracing::info!(documents = body.documents, generation = ?body.generation, "engine reloaded");
    Ok(Json(body))
}
