//! Embedding index: exact inner-product search over one immutable snapshot,
//! and the incremental reindex that produces the next snapshot.
//!
//! # Reindex policy
//!
//! A corpus document is *dirty* when its URL is not in the current snapshot,
//! its content hash differs from the stored one, or the snapshot was built
//! with a different model or dimensionality. Only dirty documents are
//! embedded; the rest reuse their stored vectors. Documents that left the
//! corpus are dropped. When nothing is dirty and nothing was dropped, no new
//! generation is written.
//!
//! A provider that learns from the corpus (tfidf) is refitted first. Its
//! model name carries a fingerprint of the fitted table, so a vocabulary that
//! moved counts as a model change and every document is re-embedded.

pub mod snapshot;

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};

use crate::config::Config;
use crate::corpus::Corpus;
use crate::embedding::{self, EmbeddingProvider, TfidfModel};
use crate::models::DocumentMeta;
use snapshot::{Manifest, Snapshot, SnapshotStore, FORMAT_VERSION};

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Row in the snapshot, which is also corpus order.
    pub position: usize,
    pub url: String,
    pub similarity: f64,
}

/// Read-only view over a committed snapshot.
#[derive(Debug, Clone)]
pub struct SemanticIndex {
    snapshot: Snapshot,
}

impl SemanticIndex {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    /// Open the committed snapshot; `Ok(None)` when none exists yet.
    pub fn open(config: &Config) -> Result<Option<Self>> {
        let store = SnapshotStore::new(&config.index.dir, config.index.keep_generations);
        Ok(store.load_current()?.map(Self::new))
    }

    pub fn manifest(&self) -> &Manifest {
        &self.snapshot.manifest
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn metadata(&self, position: usize) -> Option<&DocumentMeta> {
        self.snapshot.metadata.get(position)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Fitted tfidf table stored with the snapshot, if any.
    pub fn vocabulary(&self) -> Option<&TfidfModel> {
        self.snapshot.vocabulary.as_ref()
    }

    /// Top-`k` rows by inner product with `query` (expected unit-length).
    ///
    /// Ordered by similarity descending; equal scores keep snapshot order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        if k == 0 || self.is_empty() || query.len() != self.snapshot.manifest.dims {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|i| (i, embedding::dot(query, self.snapshot.row(i))))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(position, score)| SearchHit {
                position,
                url: self.snapshot.metadata[position].url.clone(),
                similarity: f64::from(score),
            })
            .collect()
    }
}

/// Which documents a reindex would touch.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReindexPlan {
    /// Corpus positions to embed.
    pub dirty: Vec<usize>,
    /// Corpus position → row of the previous snapshot to reuse.
    pub reused: Vec<(usize, usize)>,
    /// URLs in the previous snapshot that are no longer in the corpus.
    pub pruned: Vec<String>,
    /// The previous snapshot was built with another model or dimensionality.
    pub model_changed: bool,
}

impl ReindexPlan {
    pub fn is_noop(&self) -> bool {
        self.dirty.is_empty() && self.pruned.is_empty()
    }

    /// Reused rows whose corpus position moved; the snapshot must be
    /// rewritten to keep corpus order even though no vector changed.
    pub fn is_reordered(&self) -> bool {
        self.reused.iter().any(|(pos, row)| pos != row)
    }
}

/// Compare the corpus with the previous snapshot.
pub fn plan_reindex(
    corpus: &Corpus,
    previous: Option<&Snapshot>,
    model: &str,
    dims: usize,
    full: bool,
) -> ReindexPlan {
    let mut plan = ReindexPlan::default();

    let previous = match previous {
        Some(p) => p,
        None => {
            plan.dirty = (0..corpus.len()).collect();
            return plan;
        }
    };

    plan.model_changed = previous.manifest.model != model || previous.manifest.dims != dims;

    let previous_rows: HashMap<&str, usize> = previous
        .metadata
        .iter()
        .enumerate()
        .map(|(i, m)| (m.url.as_str(), i))
        .collect();

    for (pos, doc) in corpus.documents().iter().enumerate() {
        let reusable = match previous_rows.get(doc.url.as_str()) {
            Some(&row) if !full && !plan.model_changed => {
                let stored = previous.hashes.get(&doc.url);
                (stored.map(String::as_str) == Some(doc.content_hash().as_str())).then_some(row)
            }
            _ => None,
        };
        match reusable {
            Some(row) => plan.reused.push((pos, row)),
            None => plan.dirty.push(pos),
        }
    }

    plan.pruned = previous
        .metadata
        .iter()
        .filter(|m| corpus.get(&m.url).is_none())
        .map(|m| m.url.clone())
        .collect();

    plan
}

/// Outcome of a reindex run.
#[derive(Debug, Default, Clone)]
pub struct ReindexReport {
    pub total: usize,
    pub dirty: usize,
    pub reused: usize,
    pub pruned: usize,
    pub model_changed: bool,
    /// Set when a new generation was committed.
    pub generation: Option<u64>,
}

/// Bring the index in line with `corpus`.
///
/// With `dry_run` the plan is computed and reported but nothing is embedded
/// or written. An embedding failure aborts the run before anything is
/// written; the previous snapshot stays current.
pub async fn reindex(
    config: &Config,
    provider: &dyn EmbeddingProvider,
    corpus: &Corpus,
    full: bool,
    dry_run: bool,
) -> Result<ReindexReport> {
    let store = SnapshotStore::new(&config.index.dir, config.index.keep_generations);
    let previous = store.load_current()?;
    let docs = corpus.documents();
    let texts: Vec<String> = docs.iter().map(|d| d.indexable_text()).collect();

    let fitted = provider.fit_corpus(&texts);
    let provider: &dyn EmbeddingProvider = match &fitted {
        Some(p) => p.as_ref(),
        None => provider,
    };
    if let Some(vocabulary) = provider.vocabulary() {
        tracing::info!(
            terms = vocabulary.dims(),
            documents = vocabulary.documents(),
            model = provider.model_name(),
            "fitted tfidf vocabulary"
        );
    }

    let plan = plan_reindex(
        corpus,
        previous.as_ref(),
        provider.model_name(),
        provider.dims(),
        full,
    );

    let mut report = ReindexReport {
        total: corpus.len(),
        dirty: plan.dirty.len(),
        reused: plan.reused.len(),
        pruned: plan.pruned.len(),
        model_changed: plan.model_changed,
        generation: None,
    };

    if dry_run || (previous.is_some() && plan.is_noop() && !plan.is_reordered()) {
        return Ok(report);
    }

    let dims = provider.dims();
    let mut vectors: Vec<Option<Vec<f32>>> = vec![None; docs.len()];

    if let Some(prev) = previous.as_ref() {
        for &(pos, row) in &plan.reused {
            vectors[pos] = Some(prev.row(row).to_vec());
        }
    }

    let batch_size = config.embedding.batch_size.max(1);
    for (batch_no, batch) in plan.dirty.chunks(batch_size).enumerate() {
        let batch_texts: Vec<String> = batch.iter().map(|&pos| texts[pos].clone()).collect();
        let embedded = embedding::embed_texts(provider, &config.embedding, &batch_texts)
            .await
            .with_context(|| format!("embedding batch {} failed; index left unchanged", batch_no + 1))?;
        for (&pos, vector) in batch.iter().zip(embedded) {
            vectors[pos] = Some(vector);
        }
        tracing::debug!(
            batch = batch_no + 1,
            embedded = (batch_no * batch_size + batch.len()).min(plan.dirty.len()),
            of = plan.dirty.len(),
            "embedded batch"
        );
    }

    let mut flat = Vec::with_capacity(docs.len() * dims);
    let mut metadata = Vec::with_capacity(docs.len());
    let mut hashes = BTreeMap::new();
    for (doc, vector) in docs.iter().zip(vectors) {
        let vector = vector.with_context(|| format!("no vector produced for {}", doc.url))?;
        flat.extend(vector);
        metadata.push(DocumentMeta::from(doc));
        hashes.insert(doc.url.clone(), doc.content_hash());
    }

    let snapshot = Snapshot {
        manifest: Manifest {
            format_version: FORMAT_VERSION,
            generation: 0,
            model: provider.model_name().to_string(),
            dims,
            count: metadata.len(),
            created_at: chrono::Utc::now().to_rfc3339(),
            vocabulary_terms: None,
        },
        vectors: flat,
        metadata,
        hashes,
        vocabulary: provider.vocabulary().cloned(),
    };
    report.generation = Some(store.commit(snapshot)?);
    Ok(report)
}
