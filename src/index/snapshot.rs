//! Versioned on-disk snapshots of the embedding index.
//!
//! ```text
//! <dir>/CURRENT                  name of the committed generation
//! <dir>/gen-000007/manifest.json format version, model, dims, count
//! <dir>/gen-000007/vectors.bin   count × dims little-endian f32
//! <dir>/gen-000007/metadata.json per-row display metadata
//! <dir>/gen-000007/hashes.json   url → content hash
//! <dir>/gen-000007/vocabulary.json  tfidf terms and idf weights (tfidf only)
//! ```
//!
//! A generation is staged under a temporary name, fsynced, renamed into
//! place, and only then published by replacing `CURRENT` (temp file +
//! rename). The index directory is fsynced after each rename. A crash at
//! any point leaves the previous generation current.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::embedding::{bytes_to_vec, vec_to_bytes, TfidfModel};
use crate::error::EngineError;
use crate::models::DocumentMeta;

pub const FORMAT_VERSION: u32 = 1;

const CURRENT: &str = "CURRENT";
const MANIFEST: &str = "manifest.json";
const VECTORS: &str = "vectors.bin";
const METADATA: &str = "metadata.json";
const HASHES: &str = "hashes.json";
const VOCABULARY: &str = "vocabulary.json";

type SnapResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub generation: u64,
    pub model: String,
    pub dims: usize,
    pub count: usize,
    pub created_at: String,
    /// Term count of `vocabulary.json`, present only when one was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocabulary_terms: Option<usize>,
}

/// Contents of one generation. Row `i` of `vectors` belongs to `metadata[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub manifest: Manifest,
    /// Row-major, `count × dims`, each row L2-normalized.
    pub vectors: Vec<f32>,
    pub metadata: Vec<DocumentMeta>,
    pub hashes: BTreeMap<String, String>,
    /// Fitted table the vectors were projected with (tfidf provider).
    pub vocabulary: Option<TfidfModel>,
}

impl Snapshot {
    pub fn row(&self, i: usize) -> &[f32] {
        let d = self.manifest.dims;
        &self.vectors[i * d..(i + 1) * d]
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }
}

/// Generation directory handle for an index root.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    keep_generations: usize,
}

fn generation_name(generation: u64) -> String {
    format!("gen-{:06}", generation)
}

fn parse_generation_name(name: &str) -> Option<u64> {
    let digits = name.strip_prefix("gen-")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn write_synced(path: &Path, bytes: &[u8]) -> SnapResult<()> {
    let mut file = File::create(path).map_err(|e| EngineError::persistence(path, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| EngineError::persistence(path, e))
}

/// Persist directory entries (renames) on platforms that allow opening a
/// directory.
fn sync_dir(path: &Path) -> SnapResult<()> {
    #[cfg(unix)]
    {
        File::open(path)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| EngineError::persistence(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> SnapResult<T> {
    let bytes = fs::read(path).map_err(|e| EngineError::persistence(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| EngineError::persistence(path, e))
}

fn to_json<T: Serialize>(path: &Path, value: &T) -> SnapResult<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| EngineError::persistence(path, e))
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, keep_generations: usize) -> Self {
        Self {
            dir: dir.into(),
            keep_generations: keep_generations.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The committed generation, or `None` if nothing was ever committed.
    pub fn current_generation(&self) -> SnapResult<Option<u64>> {
        let path = self.dir.join(CURRENT);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EngineError::persistence(&path, e)),
        };
        parse_generation_name(content.trim())
            .map(Some)
            .ok_or_else(|| {
                EngineError::persistence(&path, format!("invalid generation '{}'", content.trim()))
            })
    }

    /// Load the committed generation, validating it against its manifest.
    pub fn load_current(&self) -> SnapResult<Option<Snapshot>> {
        match self.current_generation()? {
            Some(generation) => self.load(generation).map(Some),
            None => Ok(None),
        }
    }

    pub fn load(&self, generation: u64) -> SnapResult<Snapshot> {
        let gen_dir = self.dir.join(generation_name(generation));

        let manifest_path = gen_dir.join(MANIFEST);
        let manifest: Manifest = read_json(&manifest_path)?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(EngineError::persistence(
                &manifest_path,
                format!(
                    "unsupported format_version {} (expected {})",
                    manifest.format_version, FORMAT_VERSION
                ),
            ));
        }

        let vectors_path = gen_dir.join(VECTORS);
        let bytes = fs::read(&vectors_path).map_err(|e| EngineError::persistence(&vectors_path, e))?;
        let expected = manifest.count * manifest.dims * 4;
        if bytes.len() != expected {
            return Err(EngineError::persistence(
                &vectors_path,
                format!("expected {} bytes, found {}", expected, bytes.len()),
            ));
        }

        let metadata_path = gen_dir.join(METADATA);
        let metadata: Vec<DocumentMeta> = read_json(&metadata_path)?;
        if metadata.len() != manifest.count {
            return Err(EngineError::persistence(
                &metadata_path,
                format!(
                    "manifest count {} but {} metadata rows",
                    manifest.count,
                    metadata.len()
                ),
            ));
        }

        let hashes_path = gen_dir.join(HASHES);
        let hashes: BTreeMap<String, String> = read_json(&hashes_path)?;
        if hashes.len() != manifest.count {
            return Err(EngineError::persistence(
                &hashes_path,
                format!("manifest count {} but {} hashes", manifest.count, hashes.len()),
            ));
        }

        let vocabulary = match manifest.vocabulary_terms {
            Some(terms) => {
                let vocabulary_path = gen_dir.join(VOCABULARY);
                let model: TfidfModel = read_json(&vocabulary_path)?;
                if model.dims() != terms || model.dims() != manifest.dims {
                    return Err(EngineError::persistence(
                        &vocabulary_path,
                        format!(
                            "vocabulary has {} terms, manifest records {} terms and {} dims",
                            model.dims(),
                            terms,
                            manifest.dims
                        ),
                    ));
                }
                Some(model)
            }
            None => None,
        };

        Ok(Snapshot {
            manifest,
            vectors: bytes_to_vec(&bytes),
            metadata,
            hashes,
            vocabulary,
        })
    }

    /// Write `snapshot` as the next generation and publish it.
    ///
    /// The generation and count fields of the manifest are assigned here.
    /// Returns the new generation number.
    pub fn commit(&self, mut snapshot: Snapshot) -> SnapResult<u64> {
        fs::create_dir_all(&self.dir).map_err(|e| EngineError::persistence(&self.dir, e))?;

        let generation = self
            .list_generations()?
            .last()
            .copied()
            .max(self.current_generation()?)
            .map_or(1, |g| g + 1);
        snapshot.manifest.generation = generation;
        snapshot.manifest.count = snapshot.metadata.len();
        snapshot.manifest.format_version = FORMAT_VERSION;
        snapshot.manifest.vocabulary_terms = snapshot.vocabulary.as_ref().map(TfidfModel::dims);

        let name = generation_name(generation);
        let staging = self
            .dir
            .join(format!("{}.tmp-{}", name, uuid::Uuid::new_v4()));
        fs::create_dir_all(&staging).map_err(|e| EngineError::persistence(&staging, e))?;

        let staged = self.write_generation(&staging, &snapshot);
        if let Err(e) = staged {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let final_dir = self.dir.join(&name);
        fs::rename(&staging, &final_dir).map_err(|e| {
            let _ = fs::remove_dir_all(&staging);
            EngineError::persistence(&final_dir, e)
        })?;
        sync_dir(&self.dir)?;

        let pointer_tmp = self
            .dir
            .join(format!("{}.tmp-{}", CURRENT, uuid::Uuid::new_v4()));
        write_synced(&pointer_tmp, format!("{}\n", name).as_bytes())?;
        let pointer = self.dir.join(CURRENT);
        fs::rename(&pointer_tmp, &pointer).map_err(|e| {
            let _ = fs::remove_file(&pointer_tmp);
            EngineError::persistence(&pointer, e)
        })?;
        sync_dir(&self.dir)?;

        tracing::info!(
            generation,
            count = snapshot.manifest.count,
            dir = %final_dir.display(),
            "committed index snapshot"
        );

        if let Err(e) = self.prune(generation) {
            tracing::warn!("failed to prune old snapshots: {}", e);
        }
        Ok(generation)
    }

    fn write_generation(&self, dir: &Path, snapshot: &Snapshot) -> SnapResult<()> {
        let vectors_path = dir.join(VECTORS);
        write_synced(&vectors_path, &vec_to_bytes(&snapshot.vectors))?;

        let metadata_path = dir.join(METADATA);
        write_synced(&metadata_path, &to_json(&metadata_path, &snapshot.metadata)?)?;

        let hashes_path = dir.join(HASHES);
        write_synced(&hashes_path, &to_json(&hashes_path, &snapshot.hashes)?)?;

        if let Some(vocabulary) = &snapshot.vocabulary {
            let vocabulary_path = dir.join(VOCABULARY);
            write_synced(&vocabulary_path, &to_json(&vocabulary_path, vocabulary)?)?;
        }

        // Manifest last: a staged directory without one is incomplete.
        let manifest_path = dir.join(MANIFEST);
        write_synced(&manifest_path, &to_json(&manifest_path, &snapshot.manifest)?)
    }

    /// Committed generation directories, ascending.
    pub fn list_generations(&self) -> SnapResult<Vec<u64>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::persistence(&self.dir, e)),
        };
        let mut generations: Vec<u64> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| parse_generation_name(&e.file_name().to_string_lossy()))
            .collect();
        generations.sort_unstable();
        Ok(generations)
    }

    /// Remove generations older than the newest `keep_generations`, plus
    /// leftover staging directories and pointer files. `current` is never
    /// removed.
    fn prune(&self, current: u64) -> SnapResult<()> {
        let generations = self.list_generations()?;
        let cutoff = generations.len().saturating_sub(self.keep_generations);
        for generation in &generations[..cutoff] {
            if *generation == current {
                continue;
            }
            let path = self.dir.join(generation_name(*generation));
            fs::remove_dir_all(&path).map_err(|e| EngineError::persistence(&path, e))?;
            tracing::debug!(generation, "pruned index snapshot");
        }

        if let Ok(entries) = fs::read_dir(&self.dir) {
            for entry in entries.filter_map(|e| e.ok()) {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with("gen-") && name.contains(".tmp-") {
                    let _ = fs::remove_dir_all(entry.path());
                } else if name.starts_with(&format!("{}.tmp-", CURRENT)) {
                    let _ = fs::remove_file(entry.path());
                }
            }
        }
        Ok(())
    }
}
