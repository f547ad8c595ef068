//! Embedding providers and the vector helpers the index relies on.
//!
//! | `embedding.provider` | Provider | Notes |
//! |----------------------|----------|-------|
//! | `hash` | [`HashProvider`] | FNV-1a feature hashing; offline, deterministic |
//! | `tfidf` | [`TfidfProvider`] | vocabulary fitted at reindex, stored in the snapshot |
//! | `openai` | [`OpenAIProvider`] | needs `OPENAI_API_KEY` |
//! | `ollama` | [`OllamaProvider`] | `embedding.url`, default `http://localhost:11434` |
//! | `local` | `LocalProvider` | fastembed, feature `local-embeddings-fastembed` |
//! | `disabled` | [`DisabledProvider`] | reindex and search refuse to run |
//!
//! Whatever the backend, [`embed_texts`] hands back unit-length vectors so
//! the index can score with a plain inner product ([`dot`]).

pub mod hashing;
#[cfg(feature = "local-embeddings-fastembed")]
mod local;
mod remote;
pub mod tfidf;

use anyhow::{bail, Result};

use crate::config::EmbeddingConfig;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalProvider;
pub use remote::{OllamaProvider, OpenAIProvider};
pub use tfidf::{TfidfModel, TfidfProvider};

/// Identity of an embedding backend. The vectors themselves come from
/// [`embed_texts`], which dispatches on the configured provider name.
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded in each snapshot manifest.
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;

    /// Providers that learn from the corpus return a fitted copy of
    /// themselves; the rest return `None` and are used as they are.
    fn fit_corpus(&self, _texts: &[String]) -> Option<Box<dyn EmbeddingProvider>> {
        None
    }

    /// Fitted vocabulary to persist alongside the vectors, if any.
    fn vocabulary(&self) -> Option<&TfidfModel> {
        None
    }
}

/// Embed a batch of texts using the configured provider.
///
/// Vectors come back L2-normalized, one per input text, in input order.
/// A provider returning the wrong count or dimensionality is an error.
pub async fn embed_texts(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = match config.provider.as_str() {
        "hash" => texts
            .iter()
            .map(|t| hashing::embed(t, provider.dims()))
            .collect(),
        "tfidf" => match provider.vocabulary() {
            Some(model) => texts.iter().map(|t| model.transform(t)).collect(),
            None => bail!("tfidf provider has no fitted vocabulary; run `hrank reindex`"),
        },
        "openai" => remote::embed_openai(config, texts).await?,
        "ollama" => remote::embed_ollama(config, texts).await?,
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => local::embed_local(config, texts).await?,
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        "disabled" => bail!("Embedding provider is disabled"),
        other => bail!("Unknown embedding provider: {}", other),
    };

    if vectors.len() != texts.len() {
        bail!(
            "Embedding provider returned {} vectors for {} texts",
            vectors.len(),
            texts.len()
        );
    }
    for v in vectors.iter_mut() {
        if v.len() != provider.dims() {
            bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                provider.dims(),
                v.len()
            );
        }
        l2_normalize(v);
    }
    Ok(vectors)
}

/// Embed a single query text.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    text: &str,
) -> Result<Vec<f32>> {
    let results = embed_texts(provider, config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

// ============ Disabled Provider ============

pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
}

// ============ Hash Provider ============

/// Feature-hashing provider; see [`hashing`].
pub struct HashProvider {
    dims: usize,
}

impl HashProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            dims: config.dims.unwrap_or(hashing::DEFAULT_DIMS),
        }
    }
}

impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        hashing::MODEL_NAME
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

/// Create the [`EmbeddingProvider`] named by `embedding.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"hash"` | [`HashProvider`] |
/// | `"tfidf"` | [`TfidfProvider`] (unfitted) |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (feature `local-embeddings-fastembed`) |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "hash" => Ok(Box::new(HashProvider::new(config))),
        "tfidf" => Ok(Box::new(TfidfProvider::new(config))),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Provider for serving queries against a snapshot. A `tfidf` provider is
/// rebuilt around the vocabulary stored with the snapshot.
pub fn restore_provider(
    config: &EmbeddingConfig,
    vocabulary: Option<&TfidfModel>,
) -> Result<Box<dyn EmbeddingProvider>> {
    match (config.provider.as_str(), vocabulary) {
        ("tfidf", Some(model)) => Ok(Box::new(TfidfProvider::with_model(config, model.clone()))),
        _ => create_provider(config),
    }
}

/// Scale `v` to unit length in place. Zero vectors are left as they are.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Inner product. Mismatched lengths score 0.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Encode a float vector as little-endian `f32` bytes.
pub fn vec_to_bytes(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes; a trailing partial value is ignored.
pub fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
