//! Score fusion: min-max normalization, weighted combination of semantic
//! similarity with link authority, and description backfill.
//!
//! # Scoring Algorithm
//!
//! For each candidate `c` retrieved by the embedding index:
//!
//! ```text
//! combined(c) = α · similarity(c) + β · authority(c) + γ · pagerank(c)
//! ```
//!
//! `authority` and `pagerank` are min-max normalized over the scope they were
//! computed on (whole graph or query subgraph); a candidate absent from a map
//! contributes 0. Similarity is the raw cosine unless the ranking config asks
//! for it to be normalized over the candidate set.
//!
//! Results are sorted by `combined` descending. The sort is stable and the
//! input is in retrieval order, so retrieval order breaks ties.

use std::collections::HashMap;

use crate::config::FusionWeights;
use crate::models::NO_DESCRIPTION;

/// A semantic candidate, in retrieval order.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub url: String,
    pub similarity: f64,
}

/// A candidate after fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct Fused {
    pub url: String,
    pub score: f64,
    /// Raw cosine similarity, regardless of normalization.
    pub similarity: f64,
    pub pagerank: f64,
    pub authority: f64,
}

/// Min-max normalize to `[0, 1]`.
///
/// A constant map (including a single entry) maps every value to 0.0, so a
/// signal that cannot discriminate contributes nothing.
pub fn normalize(scores: &HashMap<String, f64>) -> HashMap<String, f64> {
    if scores.is_empty() {
        return HashMap::new();
    }

    let s_min = scores.values().copied().fold(f64::INFINITY, f64::min);
    let s_max = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = s_max - s_min;

    scores
        .iter()
        .map(|(url, s)| {
            let norm = if range.abs() < f64::EPSILON {
                0.0
            } else {
                (s - s_min) / range
            };
            (url.clone(), norm)
        })
        .collect()
}

fn normalize_values(values: &[f64]) -> Vec<f64> {
    let s_min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let s_max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = s_max - s_min;
    values
        .iter()
        .map(|v| {
            if range.abs() < f64::EPSILON {
                0.0
            } else {
                (v - s_min) / range
            }
        })
        .collect()
}

/// Combine similarity with (already normalized) link scores.
pub fn fuse(
    candidates: &[Candidate],
    pagerank: &HashMap<String, f64>,
    authority: &HashMap<String, f64>,
    weights: FusionWeights,
    normalize_similarity: bool,
) -> Vec<Fused> {
    let raw: Vec<f64> = candidates.iter().map(|c| c.similarity).collect();
    let similarity = if normalize_similarity {
        normalize_values(&raw)
    } else {
        raw
    };

    let mut fused: Vec<Fused> = candidates
        .iter()
        .zip(similarity)
        .map(|(c, sim)| {
            let pr = pagerank.get(&c.url).copied().unwrap_or(0.0);
            let auth = authority.get(&c.url).copied().unwrap_or(0.0);
            Fused {
                url: c.url.clone(),
                score: weights.similarity * sim + weights.authority * auth + weights.pagerank * pr,
                similarity: c.similarity,
                pagerank: pr,
                authority: auth,
            }
        })
        .collect();

    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused
}

/// True when a stored description is missing or carries no information.
pub fn needs_backfill(description: Option<&str>) -> bool {
    let d = match description {
        Some(d) => d.trim(),
        None => return true,
    };
    if d.is_empty() || d.eq_ignore_ascii_case(NO_DESCRIPTION) || d.eq_ignore_ascii_case("nan") {
        return true;
    }
    let lower = d.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// The description to show: the stored one, or the first `max_tokens`
/// whitespace-separated tokens of the body.
pub fn backfill_description(description: Option<&str>, body: &str, max_tokens: usize) -> String {
    if needs_backfill(description) {
        body.split_whitespace()
            .take(max_tokens)
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        description.unwrap_or_default().trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn cand(url: &str, similarity: f64) -> Candidate {
        Candidate {
            url: url.into(),
            similarity,
        }
    }

    #[test]
    fn test_normalize_range() {
        let n = normalize(&map(&[("a", 10.0), ("b", 5.0), ("c", 0.0)]));
        assert!((n["a"] - 1.0).abs() < 1e-9);
        assert!((n["b"] - 0.5).abs() < 1e-9);
        assert!((n["c"] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_constant_is_zero() {
        let n = normalize(&map(&[("a", 3.0), ("b", 3.0)]));
        assert!(n.values().all(|v| *v == 0.0));
        let single = normalize(&map(&[("a", 0.7)]));
        assert_eq!(single["a"], 0.0);
        assert!(normalize(&HashMap::new()).is_empty());
    }

    #[test]
    fn test_normalize_always_in_unit() {
        let n = normalize(&map(&[("a", -5.0), ("b", 100.0), ("c", 42.0)]));
        for v in n.values() {
            assert!(*v >= 0.0 && *v <= 1.0, "out of range: {}", v);
        }
    }

    #[test]
    fn test_similarity_only_weights_keep_semantic_order() {
        let candidates = vec![cand("a", 0.9), cand("b", 0.7), cand("c", 0.4)];
        let pr = map(&[("a", 0.0), ("b", 1.0), ("c", 0.5)]);
        let auth = map(&[("c", 1.0)]);
        let fused = fuse(&candidates, &pr, &auth, FusionWeights::new(1.0, 0.0, 0.0), false);
        let order: Vec<&str> = fused.iter().map(|f| f.url.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_link_scores_can_reorder() {
        let candidates = vec![cand("a", 0.80), cand("b", 0.78)];
        let pr = map(&[("a", 0.0), ("b", 1.0)]);
        let fused = fuse(&candidates, &pr, &HashMap::new(), FusionWeights::new(0.6, 0.2, 0.2), false);
        assert_eq!(fused[0].url, "b");
        assert!((fused[0].score - (0.6 * 0.78 + 0.2)).abs() < 1e-9);
        assert_eq!(fused[0].authority, 0.0);
    }

    #[test]
    fn test_missing_scores_contribute_zero_and_ties_keep_retrieval_order() {
        let candidates = vec![cand("x", 0.5), cand("y", 0.5)];
        let fused = fuse(
            &candidates,
            &HashMap::new(),
            &HashMap::new(),
            FusionWeights::new(0.6, 0.2, 0.2),
            false,
        );
        assert_eq!(fused[0].url, "x");
        assert_eq!(fused[1].url, "y");
        assert_eq!(fused[0].score, fused[1].score);
    }

    #[test]
    fn test_normalized_similarity_keeps_raw_value() {
        let candidates = vec![cand("a", 0.9), cand("b", 0.3)];
        let fused = fuse(
            &candidates,
            &HashMap::new(),
            &HashMap::new(),
            FusionWeights::new(1.0, 0.0, 0.0),
            true,
        );
        assert_eq!(fused[0].score, 1.0);
        assert_eq!(fused[1].score, 0.0);
        assert_eq!(fused[1].similarity, 0.3);
    }

    #[test]
    fn test_backfill_no_description_sentinel() {
        let body: Vec<String> = (1..=40).map(|i| format!("w{}", i)).collect();
        let body = body.join(" ");
        let expected: Vec<String> = (1..=30).map(|i| format!("w{}", i)).collect();

        for desc in [None, Some(""), Some("No Description"), Some("  no description ")] {
            assert_eq!(backfill_description(desc, &body, 30), expected.join(" "));
        }
    }

    #[test]
    fn test_backfill_bare_url() {
        assert_eq!(
            backfill_description(Some("https://example.com/page"), "short body", 30),
            "short body"
        );
        assert_eq!(
            backfill_description(Some("https://example.com/page more text"), "short body", 30),
            "short body"
        );
        assert!(needs_backfill(Some("HTTP://example.com")));
        assert_eq!(
            backfill_description(Some("Read more at https://example.com"), "body", 30),
            "Read more at https://example.com"
        );
    }

    #[test]
    fn test_real_description_kept() {
        assert_eq!(
            backfill_description(Some(" A page about rivers. "), "body", 30),
            "A page about rivers."
        );
    }
}
