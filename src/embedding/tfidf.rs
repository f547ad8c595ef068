//! TF-IDF vectors over a vocabulary fitted to the corpus.
//!
//! Tokens are runs of two or more word characters in the lowercased text,
//! minus a fixed list of English stop words. Fitting keeps terms that appear
//! in at most `max_df` of the documents, optionally trims the vocabulary to
//! the `max_features` most frequent terms, and assigns each term the smoothed
//! inverse document frequency `ln((1 + n) / (1 + df)) + 1`. Columns follow
//! alphabetical term order.
//!
//! The fitted [`TfidfModel`] is stored next to the vectors in each snapshot
//! so queries are projected onto the same vocabulary as the documents.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;

pub const MODEL_PREFIX: &str = "tfidf";

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst",
    "amoungst", "amount", "an", "and", "another", "any", "anyhow", "anyone", "anything", "anyway",
    "anywhere", "are", "around", "as", "at", "back", "be", "became", "because", "become",
    "becomes", "becoming", "been", "before", "beforehand", "behind", "being", "below", "beside",
    "besides", "between", "beyond", "bill", "both", "bottom", "but", "by", "call", "can",
    "cannot", "cant", "co", "con", "could", "couldnt", "cry", "de", "describe", "detail", "do",
    "done", "down", "due", "during", "each", "eg", "eight", "either", "eleven", "else",
    "elsewhere", "empty", "enough", "etc", "even", "ever", "every", "everyone", "everything",
    "everywhere", "except", "few", "fifteen", "fifty", "fill", "find", "fire", "first", "five",
    "for", "former", "formerly", "forty", "found", "four", "from", "front", "full", "further",
    "get", "give", "go", "had", "has", "hasnt", "have", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his",
    "how", "however", "hundred", "i", "ie", "if", "in", "inc", "indeed", "interest", "into",
    "is", "it", "its", "itself", "keep", "last", "latter", "latterly", "least", "less", "ltd",
    "made", "many", "may", "me", "meanwhile", "might", "mill", "mine", "more", "moreover",
    "most", "mostly", "move", "much", "must", "my", "myself", "name", "namely", "neither",
    "never", "nevertheless", "next", "nine", "no", "nobody", "none", "noone", "nor", "not",
    "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto", "or",
    "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own", "part",
    "per", "perhaps", "please", "put", "rather", "re", "same", "see", "seem", "seemed",
    "seeming", "seems", "serious", "several", "she", "should", "show", "side", "since",
    "sincere", "six", "sixty", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "system", "take", "ten", "than", "that", "the",
    "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "thick", "thin", "third", "this",
    "those", "though", "three", "through", "throughout", "thru", "thus", "to", "together", "too",
    "top", "toward", "towards", "twelve", "twenty", "two", "un", "under", "until", "up", "upon",
    "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when", "whence",
    "whenever", "where", "whereafter", "whereas", "whereby", "wherein", "whereupon", "wherever",
    "whether", "which", "while", "whither", "who", "whoever", "whole", "whom", "whose", "why",
    "will", "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    "yourselves",
];

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("valid token regex"))
}

fn tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_pattern()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|t| !stop_words().contains(t))
        .map(str::to_string)
        .collect()
}

/// Serialized form of a [`TfidfModel`], checked on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermTable {
    documents: usize,
    terms: Vec<String>,
    idf: Vec<f32>,
}

/// Vocabulary and IDF weights fitted over one corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TermTable", into = "TermTable")]
pub struct TfidfModel {
    documents: usize,
    terms: Vec<String>,
    idf: Vec<f32>,
    columns: HashMap<String, usize>,
}

impl TryFrom<TermTable> for TfidfModel {
    type Error = String;

    fn try_from(table: TermTable) -> Result<Self, Self::Error> {
        if table.terms.len() != table.idf.len() {
            return Err(format!(
                "vocabulary has {} terms but {} idf weights",
                table.terms.len(),
                table.idf.len()
            ));
        }
        let columns: HashMap<String, usize> = table
            .terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        if columns.len() != table.terms.len() {
            return Err("vocabulary contains duplicate terms".to_string());
        }
        Ok(Self {
            documents: table.documents,
            terms: table.terms,
            idf: table.idf,
            columns,
        })
    }
}

impl From<TfidfModel> for TermTable {
    fn from(model: TfidfModel) -> Self {
        Self {
            documents: model.documents,
            terms: model.terms,
            idf: model.idf,
        }
    }
}

impl TfidfModel {
    /// Fit the vocabulary and IDF weights over `texts`.
    ///
    /// A term survives when it appears in no more than
    /// `max(1, floor(max_df * n))` documents.
    pub fn fit(texts: &[String], max_df: f64, max_features: Option<usize>) -> Self {
        let n = texts.len();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut totals: HashMap<String, usize> = HashMap::new();
        for text in texts {
            let mut seen = HashSet::new();
            for token in tokens(text) {
                *totals.entry(token.clone()).or_default() += 1;
                if seen.insert(token.clone()) {
                    *doc_freq.entry(token).or_default() += 1;
                }
            }
        }

        let max_count = ((max_df * n as f64).floor() as usize).max(1);
        let mut kept: Vec<(String, usize)> = doc_freq
            .into_iter()
            .filter(|(_, df)| *df <= max_count)
            .collect();

        if let Some(limit) = max_features {
            if kept.len() > limit {
                kept.sort_by(|a, b| totals[&b.0].cmp(&totals[&a.0]).then_with(|| a.0.cmp(&b.0)));
                kept.truncate(limit);
            }
        }
        kept.sort_by(|a, b| a.0.cmp(&b.0));

        if kept.is_empty() {
            tracing::warn!(documents = n, "tfidf vocabulary is empty; every vector will be zero");
        }

        let idf = kept
            .iter()
            .map(|(_, df)| (((1 + n) as f64 / (1 + df) as f64).ln() + 1.0) as f32)
            .collect();
        let terms: Vec<String> = kept.into_iter().map(|(t, _)| t).collect();
        let columns = terms.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();

        Self {
            documents: n,
            terms,
            idf,
            columns,
        }
    }

    /// Project `text` onto the vocabulary. Out-of-vocabulary terms are ignored.
    pub fn transform(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.terms.len()];
        for token in tokens(text) {
            if let Some(&col) = self.columns.get(&token) {
                v[col] += self.idf[col];
            }
        }
        super::l2_normalize(&mut v);
        v
    }

    pub fn dims(&self) -> usize {
        self.terms.len()
    }

    pub fn documents(&self) -> usize {
        self.documents
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn idf(&self, term: &str) -> Option<f32> {
        self.columns.get(term).map(|&col| self.idf[col])
    }

    /// Short content hash; two fits agree on it only when they would embed
    /// every text identically.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.documents as u64).to_le_bytes());
        for (term, idf) in self.terms.iter().zip(&self.idf) {
            hasher.update(term.as_bytes());
            hasher.update([0u8]);
            hasher.update(idf.to_bits().to_le_bytes());
        }
        let hex = format!("{:x}", hasher.finalize());
        hex[..12].to_string()
    }
}

/// Provider whose vectors come from a fitted [`TfidfModel`].
///
/// Built unfitted from config; `reindex` fits it over the corpus and the
/// engine restores the fitted table from the current snapshot.
pub struct TfidfProvider {
    name: String,
    model: Option<TfidfModel>,
    max_df: f64,
    max_features: Option<usize>,
}

impl TfidfProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            name: MODEL_PREFIX.to_string(),
            model: None,
            max_df: config.max_df,
            max_features: config.max_features,
        }
    }

    pub fn with_model(config: &EmbeddingConfig, model: TfidfModel) -> Self {
        Self {
            name: format!("{}-{}", MODEL_PREFIX, model.fingerprint()),
            model: Some(model),
            max_df: config.max_df,
            max_features: config.max_features,
        }
    }
}

impl EmbeddingProvider for TfidfProvider {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> usize {
        self.model.as_ref().map_or(0, TfidfModel::dims)
    }

    fn fit_corpus(&self, texts: &[String]) -> Option<Box<dyn EmbeddingProvider>> {
        let model = TfidfModel::fit(texts, self.max_df, self.max_features);
        Some(Box::new(Self {
            name: format!("{}-{}", MODEL_PREFIX, model.fingerprint()),
            model: Some(model),
            max_df: self.max_df,
            max_features: self.max_features,
        }))
    }

    fn vocabulary(&self) -> Option<&TfidfModel> {
        self.model.as_ref()
    }
}
