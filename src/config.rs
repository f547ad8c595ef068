use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub dir: PathBuf,
    /// Committed generations kept on disk after a swap (current included).
    #[serde(default = "default_keep_generations")]
    pub keep_generations: usize,
}

fn default_keep_generations() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    /// tfidf: terms in more than this fraction of documents are dropped.
    #[serde(default = "default_max_df")]
    pub max_df: f64,
    /// tfidf: keep only the most frequent terms across the corpus.
    #[serde(default = "default_max_features")]
    pub max_features: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
            max_df: default_max_df(),
            max_features: default_max_features(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_df() -> f64 {
    0.9
}
fn default_max_features() -> Option<usize> {
    Some(10_000)
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    #[serde(default = "default_damping")]
    pub damping: f64,
    #[serde(default = "default_pagerank_max_iter")]
    pub max_iter: usize,
    #[serde(default = "default_pagerank_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_hits_max_iter")]
    pub hits_max_iter: usize,
    #[serde(default = "default_hits_tolerance")]
    pub hits_tolerance: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            damping: default_damping(),
            max_iter: default_pagerank_max_iter(),
            tolerance: default_pagerank_tolerance(),
            hits_max_iter: default_hits_max_iter(),
            hits_tolerance: default_hits_tolerance(),
        }
    }
}

fn default_damping() -> f64 {
    0.85
}
fn default_pagerank_max_iter() -> usize {
    100
}
fn default_pagerank_tolerance() -> f64 {
    1.0e-6
}
fn default_hits_max_iter() -> usize {
    500
}
fn default_hits_tolerance() -> f64 {
    1.0e-8
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    #[serde(default = "default_description_tokens")]
    pub description_tokens: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            description_tokens: default_description_tokens(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_max_top_k() -> usize {
    100
}
fn default_description_tokens() -> usize {
    30
}

/// Weights of one fusion profile: `α·similarity + β·authority + γ·pagerank`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    #[serde(default)]
    pub similarity: f64,
    #[serde(default)]
    pub authority: f64,
    #[serde(default)]
    pub pagerank: f64,
}

impl FusionWeights {
    pub const fn new(similarity: f64, authority: f64, pagerank: f64) -> Self {
        Self {
            similarity,
            authority,
            pagerank,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    #[serde(default = "default_profile")]
    pub default_profile: String,
    /// Min-max scale similarities over the candidate set before fusing.
    /// Off by default: raw cosine similarity is already on a bounded scale.
    #[serde(default)]
    pub normalize_similarity: bool,
    #[serde(default = "default_profiles")]
    pub profiles: BTreeMap<String, FusionWeights>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            default_profile: default_profile(),
            normalize_similarity: false,
            profiles: default_profiles(),
        }
    }
}

fn default_profile() -> String {
    "canonical".to_string()
}

fn default_profiles() -> BTreeMap<String, FusionWeights> {
    let mut profiles = BTreeMap::new();
    profiles.insert("canonical".to_string(), FusionWeights::new(0.6, 0.2, 0.2));
    profiles.insert("link-pagerank".to_string(), FusionWeights::new(0.5, 0.0, 0.5));
    profiles.insert(
        "link-authority".to_string(),
        FusionWeights::new(0.5, 0.5, 0.0),
    );
    profiles
}

impl RankingConfig {
    /// Resolve a profile by name, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<FusionWeights> {
        let name = name.unwrap_or(&self.default_profile);
        self.profiles.get(name).copied().ok_or_else(|| {
            let known: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
            anyhow::anyhow!(
                "Unknown ranking profile: '{}'. Configured profiles: {}",
                name,
                known.join(", ")
            )
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// A config rooted at `dir`, with every other section at its defaults.
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            db: DbConfig {
                path: dir.join("corpus.sqlite"),
            },
            index: IndexConfig {
                dir: dir.join("index"),
                keep_generations: default_keep_generations(),
            },
            embedding: EmbeddingConfig::default(),
            graph: GraphConfig::default(),
            retrieval: RetrievalConfig::default(),
            ranking: RankingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.index.keep_generations == 0 {
        anyhow::bail!("index.keep_generations must be >= 1");
    }

    // Validate graph
    if !(config.graph.damping > 0.0 && config.graph.damping < 1.0) {
        anyhow::bail!("graph.damping must be in (0.0, 1.0)");
    }
    if config.graph.max_iter == 0 || config.graph.hits_max_iter == 0 {
        anyhow::bail!("graph.max_iter and graph.hits_max_iter must be > 0");
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.max_top_k < config.retrieval.top_k {
        anyhow::bail!("retrieval.max_top_k must be >= retrieval.top_k");
    }

    // Validate ranking
    for (name, w) in &config.ranking.profiles {
        if w.similarity < 0.0 || w.authority < 0.0 || w.pagerank < 0.0 {
            anyhow::bail!("ranking.profiles.{}: weights must be >= 0", name);
        }
        if w.similarity + w.authority + w.pagerank <= 0.0 {
            anyhow::bail!("ranking.profiles.{}: at least one weight must be > 0", name);
        }
    }
    if !config
        .ranking
        .profiles
        .contains_key(&config.ranking.default_profile)
    {
        anyhow::bail!(
            "ranking.default_profile '{}' is not defined under [ranking.profiles]",
            config.ranking.default_profile
        );
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "local" => {}
        "tfidf" => {
            if config.embedding.dims.is_some() {
                anyhow::bail!("embedding.dims is not used by tfidf; dimensions follow the fitted vocabulary");
            }
            if !(config.embedding.max_df > 0.0 && config.embedding.max_df <= 1.0) {
                anyhow::bail!("embedding.max_df must be in (0, 1]");
            }
            if config.embedding.max_features == Some(0) {
                anyhow::bail!("embedding.max_features must be > 0");
            }
        }
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, tfidf, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    const MINIMAL: &str = r#"
[db]
path = "/tmp/corpus.sqlite"

[index]
dir = "/tmp/index"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.graph.damping, 0.85);
        assert_eq!(config.graph.hits_max_iter, 500);
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(config.retrieval.description_tokens, 30);
        assert_eq!(config.ranking.default_profile, "canonical");
    }

    #[test]
    fn test_named_profiles_present() {
        let config = parse(MINIMAL).unwrap();
        let canonical = config.ranking.profile(None).unwrap();
        assert_eq!(canonical, FusionWeights::new(0.6, 0.2, 0.2));
        let pr = config.ranking.profile(Some("link-pagerank")).unwrap();
        assert_eq!(pr, FusionWeights::new(0.5, 0.0, 0.5));
        let auth = config.ranking.profile(Some("link-authority")).unwrap();
        assert_eq!(auth, FusionWeights::new(0.5, 0.5, 0.0));
    }

    #[test]
    fn test_unknown_profile_errors() {
        let config = parse(MINIMAL).unwrap();
        let err = config.ranking.profile(Some("nope")).unwrap_err();
        assert!(err.to_string().contains("Unknown ranking profile"));
    }

    #[test]
    fn test_custom_profile_replaces_defaults() {
        let src = format!(
            "{}\n[ranking]\ndefault_profile = \"semantic-heavy\"\n\n[ranking.profiles.semantic-heavy]\nsimilarity = 0.9\npagerank = 0.1\n",
            MINIMAL
        );
        let config = parse(&src).unwrap();
        let w = config.ranking.profile(None).unwrap();
        assert_eq!(w, FusionWeights::new(0.9, 0.0, 0.1));
        assert!(config.ranking.profile(Some("canonical")).is_err());
    }

    #[test]
    fn test_rejects_bad_damping() {
        let src = format!("{}\n[graph]\ndamping = 1.5\n", MINIMAL);
        let err = parse(&src).unwrap_err();
        assert!(err.to_string().contains("damping"));
    }

    #[test]
    fn test_rejects_missing_default_profile() {
        let src = format!("{}\n[ranking]\ndefault_profile = \"ghost\"\n", MINIMAL);
        let err = parse(&src).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_openai_requires_model_and_dims() {
        let src = format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL);
        let err = parse(&src).unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_unknown_provider_errors() {
        let src = format!("{}\n[embedding]\nprovider = \"magic\"\n", MINIMAL);
        let err = parse(&src).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_tfidf_settings() {
        let src = format!("{}\n[embedding]\nprovider = \"tfidf\"\n", MINIMAL);
        let config = parse(&src).unwrap();
        assert_eq!(config.embedding.max_df, 0.9);
        assert_eq!(config.embedding.max_features, Some(10_000));

        let src = format!("{}\n[embedding]\nprovider = \"tfidf\"\nmax_df = 0.0\n", MINIMAL);
        assert!(parse(&src).unwrap_err().to_string().contains("max_df"));

        let src = format!("{}\n[embedding]\nprovider = \"tfidf\"\ndims = 64\n", MINIMAL);
        assert!(parse(&src).unwrap_err().to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse(include_str!("../config/hrank.example.toml")).unwrap();
        assert_eq!(config.ranking.profiles.len(), 3);
        assert_eq!(
            config.ranking.profile(Some("link-pagerank")).unwrap(),
            FusionWeights::new(0.5, 0.0, 0.5)
        );
        assert_eq!(config.server.bind, "127.0.0.1:7341");
    }
}
