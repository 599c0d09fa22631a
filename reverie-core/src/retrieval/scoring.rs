//! Per-criterion scoring functions for the ranking engine.
//!
//! Score = w₁·Recency(n) + w₂·Importance(n) + w₃·Relevance(n)
//!
//! Where, over one candidate set:
//!   Recency(n)    = decay ^ (number of candidates accessed more recently than n)
//!   Importance(n) = min-max normalized importance
//!   Relevance(n)  = min-max normalized cosine similarity to the query

use crate::memory::MemoryNode;
use crate::types::Embedding;

/// Geometric recency score for each candidate, aligned with `candidates`.
///
/// A candidate's exponent is how many other candidates were accessed
/// strictly later, so the most recent node scores 1 and candidates with
/// equal `last_accessed` share a score.
#[must_use]
pub fn recency_scores(candidates: &[&MemoryNode], decay: f64) -> Vec<f64> {
    let mut newest_first: Vec<_> = candidates.iter().map(|n| n.last_accessed).collect();
    newest_first.sort_unstable_by(|a, b| b.cmp(a));

    candidates
        .iter()
        .map(|node| {
            let more_recent = newest_first.partition_point(|t| *t > node.last_accessed);
            decay.powi(i32::try_from(more_recent).unwrap_or(i32::MAX))
        })
        .collect()
}

/// Raw importance of each candidate.
#[must_use]
pub fn importance_raw(candidates: &[&MemoryNode]) -> Vec<f64> {
    candidates.iter().map(|n| f64::from(n.importance)).collect()
}

/// Raw cosine similarity of each candidate to `query`.
#[must_use]
pub fn relevance_raw(candidates: &[&MemoryNode], query: &Embedding) -> Vec<f64> {
    candidates
        .iter()
        .map(|n| f64::from(n.embedding.cosine_similarity(query)))
        .collect()
}

/// Min-max scale `values` to \[0, 1\].
///
/// With fewer than two distinct values there is no signal, and every
/// normalized score is 0.
#[must_use]
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !range.is_finite() || range <= f64::EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}
