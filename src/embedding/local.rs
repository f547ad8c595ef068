//! In-process inference through fastembed (feature `local-embeddings-fastembed`).
//!
//! Models are fetched from Hugging Face on first use and cached; later runs
//! are offline.

use anyhow::{anyhow, bail, Result};

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;

const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

/// Supported model names, their fastembed identifiers and output sizes.
const MODELS: [(&str, fastembed::EmbeddingModel, usize); 5] = [
    ("all-minilm-l6-v2", fastembed::EmbeddingModel::AllMiniLML6V2, 384),
    ("bge-small-en-v1.5", fastembed::EmbeddingModel::BGESmallENV15, 384),
    ("bge-base-en-v1.5", fastembed::EmbeddingModel::BGEBaseENV15, 768),
    ("bge-large-en-v1.5", fastembed::EmbeddingModel::BGELargeENV15, 1024),
    ("nomic-embed-text-v1.5", fastembed::EmbeddingModel::NomicEmbedTextV15, 768),
];

fn lookup(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    MODELS
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, model, dims)| (model.clone(), *dims))
        .ok_or_else(|| {
            let known: Vec<&str> = MODELS.iter().map(|(n, _, _)| *n).collect();
            anyhow!(
                "Unknown local embedding model: '{}'. Supported models: {}",
                name,
                known.join(", ")
            )
        })
}

fn model_name(config: &EmbeddingConfig) -> String {
    config
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

pub struct LocalProvider {
    model_name: String,
    dims: usize,
}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = model_name(config);
        let (_, native_dims) = lookup(&model_name)?;
        let dims = config.dims.unwrap_or(native_dims);
        if dims != native_dims {
            bail!(
                "{} produces {} dims but embedding.dims is {}",
                model_name,
                native_dims,
                dims
            );
        }
        Ok(Self { model_name, dims })
    }
}

impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

pub(super) async fn embed_local(
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let (model, _) = lookup(&model_name(config))?;
    let batch_size = config.batch_size;
    let texts = texts.to_vec();

    // ONNX inference is CPU-bound; keep it off the async workers.
    tokio::task::spawn_blocking(move || {
        let mut embedder = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(model).with_show_download_progress(false),
        )
        .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
        embedder
            .embed(texts, Some(batch_size))
            .map_err(|e| anyhow!("Local embedding failed: {}", e))
    })
    .await?
}
