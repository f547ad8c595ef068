//! HTTP embedding backends: OpenAI and Ollama.
//!
//! Both share one retry loop. HTTP 429 and 5xx responses and network errors
//! are retried with exponential backoff (1s, 2s, 4s, ... capped at 32s); any
//! other non-success status fails at once.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;

const OPENAI_URL: &str = "https://api.openai.com/v1/embeddings";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
const MAX_BACKOFF_EXP: u32 = 5;

fn required<T: Clone>(value: &Option<T>, field: &str, backend: &str) -> Result<T> {
    value
        .clone()
        .ok_or_else(|| anyhow!("embedding.{} required for {} provider", field, backend))
}

/// Embedding provider using the OpenAI API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = required(&config.model, "model", "OpenAI")?;
        let dims = required(&config.dims, "dims", "OpenAI")?;
        std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY environment variable not set")?;
        Ok(Self { model, dims })
    }
}

impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

/// Embedding provider using a local Ollama instance (`POST /api/embed`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            model: required(&config.model, "model", "Ollama")?,
            dims: required(&config.dims, "dims", "Ollama")?,
        })
    }
}

impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIItem>,
}

#[derive(Debug, Deserialize)]
struct OpenAIItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl OpenAIResponse {
    /// Vectors in request order; the API may answer out of order.
    fn into_vectors(self) -> Vec<Vec<f32>> {
        let mut items: Vec<(usize, Vec<f32>)> = self
            .data
            .into_iter()
            .enumerate()
            .map(|(pos, item)| (item.index.unwrap_or(pos), item.embedding))
            .collect();
        items.sort_by_key(|(i, _)| *i);
        items.into_iter().map(|(_, v)| v).collect()
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(MAX_BACKOFF_EXP))
}

/// POST a JSON request built by `request`, retrying transient failures.
async fn post_with_retry<T, F>(config: &EmbeddingConfig, backend: &str, request: F) -> Result<T>
where
    T: DeserializeOwned,
    F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
{
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let mut last_err = None;
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = backoff(attempt);
            tracing::debug!(backend, attempt, ?delay, "retrying embeddings request");
            tokio::time::sleep(delay).await;
        }

        let response = match request(&client).send().await {
            Ok(r) => r,
            Err(e) => {
                last_err = Some(anyhow::Error::new(e).context(format!("{} request failed", backend)));
                continue;
            }
        };

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .with_context(|| format!("Invalid {} embeddings response", backend));
        }

        let body = response.text().await.unwrap_or_default();
        let err = anyhow!("{} API error {}: {}", backend, status, body);
        if !is_retryable(status) {
            return Err(err);
        }
        last_err = Some(err);
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", backend)))
}

pub(super) async fn embed_openai(
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")?;
    let model = required(&config.model, "model", "OpenAI")?;
    let body = serde_json::json!({ "model": model, "input": texts });

    let response: OpenAIResponse = post_with_retry(config, "OpenAI", |client| {
        client.post(OPENAI_URL).bearer_auth(&api_key).json(&body)
    })
    .await?;
    Ok(response.into_vectors())
}

pub(super) async fn embed_ollama(
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let model = required(&config.model, "model", "Ollama")?;
    let base = config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL);
    let endpoint = format!("{}/api/embed", base.trim_end_matches('/'));
    let body = serde_json::json!({ "model": model, "input": texts });

    let response: OllamaResponse =
        post_with_retry(config, "Ollama", |client| client.post(&endpoint).json(&body))
            .await
            .with_context(|| format!("is Ollama running at {}?", base))?;
    Ok(response.embeddings)
}
