//! Memory Retrieval: decay-weighted multi-criterion ranking.
//!
//! Every candidate node is scored against a focal query on three criteria:
//!   Score = w₁·Recency + w₂·Importance + w₃·Relevance
//!
//! Based on the Generative Agents retrieval function. Recency is geometric
//! in access rank, so a handful of recently touched nodes dominate a long
//! tail; importance and relevance are min-max normalized per query.
//!
//! Ranking is pure. Marking the selected nodes as accessed is a separate
//! step ([`RankingEngine::commit_access`]) so callers that stage work, like
//! reflection, can defer every mutation until they commit.

pub mod scoring;

use std::cmp::Reverse;
use std::collections::BTreeSet;

use tracing::debug;

use crate::config::{RetrievalConfig, RetrievalWeights};
use crate::error::Result;
use crate::memory::{MemoryNode, MemoryStore};
use crate::types::{Embedding, NodeId, NodeKind, RetrievalScore, SimTime};

/// A ranked retrieval result.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedNode {
    /// The selected node.
    pub id: NodeId,
    /// Combined weighted score.
    pub score: f64,
    /// Per-criterion breakdown (weighted contributions).
    pub breakdown: ScoreBreakdown,
}

/// Breakdown of a retrieval score into its weighted criteria.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreBreakdown {
    /// Recency contribution.
    pub recency: f64,
    /// Importance contribution.
    pub importance: f64,
    /// Relevance contribution.
    pub relevance: f64,
}

/// A focal query together with its embedding.
#[derive(Debug, Clone)]
pub struct FocalQuery {
    /// The statement being thought about.
    pub text: String,
    /// Its embedding.
    pub embedding: Embedding,
}

/// The ranked top-K for one focal query.
#[derive(Debug, Clone)]
pub struct FocalRetrieval {
    /// The focal statement.
    pub focal_point: String,
    /// Selected nodes, best first.
    pub nodes: Vec<RankedNode>,
}

impl FocalRetrieval {
    /// Ids of the selected nodes, best first.
    #[must_use]
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id).collect()
    }
}

/// The ranking engine that selects the nodes relevant to a focal query.
#[derive(Debug, Clone)]
pub struct RankingEngine {
    config: RetrievalConfig,
}

impl RankingEngine {
    /// Create a new ranking engine with the given configuration.
    #[must_use]
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    /// The same engine with different criterion weights.
    #[must_use]
    pub fn with_weights(mut self, weights: RetrievalWeights) -> Self {
        self.config.weights = weights;
        self
    }

    /// Configured retrieval width.
    #[must_use]
    pub fn top_k(&self) -> usize {
        self.config.top_k
    }

    /// Score `candidates` against one query and return the best `k`.
    ///
    /// Ties on combined score go to the more recently accessed node, then
    /// to the newer node. Does not mutate anything.
    #[must_use]
    pub fn rank(&self, candidates: &[&MemoryNode], query: &Embedding, k: usize) -> Vec<RankedNode> {
        let recency = scoring::recency_scores(candidates, self.config.recency_decay);
        self.rank_with_recency(candidates, &recency, query, k)
    }

    fn rank_with_recency(
        &self,
        candidates: &[&MemoryNode],
        recency: &[f64],
        query: &Embedding,
        k: usize,
    ) -> Vec<RankedNode> {
        let weights = &self.config.weights;
        let importance = scoring::min_max_normalize(&scoring::importance_raw(candidates));
        let relevance = scoring::min_max_normalize(&scoring::relevance_raw(candidates, query));

        let mut results: Vec<(&MemoryNode, RankedNode)> = candidates
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let breakdown = ScoreBreakdown {
                    recency: weights.recency * recency[i],
                    importance: weights.importance * importance[i],
                    relevance: weights.relevance * relevance[i],
                };
                let score = breakdown.recency + breakdown.importance + breakdown.relevance;
                (
                    *node,
                    RankedNode {
                        id: node.id,
                        score,
                        breakdown,
                    },
                )
            })
            .collect();

        results.sort_by_key(|(node, ranked)| {
            (
                Reverse(RetrievalScore::new(ranked.score)),
                Reverse(node.last_accessed),
                Reverse(node.id),
            )
        });
        results.truncate(k);
        results.into_iter().map(|(_, ranked)| ranked).collect()
    }

    /// Rank several focal queries independently against the same candidates.
    ///
    /// Each query computes its own normalization bounds; the recency ranks
    /// are shared because they do not depend on the query.
    #[must_use]
    pub fn rank_many(
        &self,
        candidates: &[&MemoryNode],
        queries: &[FocalQuery],
        k: usize,
    ) -> Vec<FocalRetrieval> {
        let recency = scoring::recency_scores(candidates, self.config.recency_decay);
        queries
            .iter()
            .map(|query| FocalRetrieval {
                focal_point: query.text.clone(),
                nodes: self.rank_with_recency(candidates, &recency, &query.embedding, k),
            })
            .collect()
    }

    /// Mark every node in `retrievals` as accessed at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::NotFound`](crate::ReverieError::NotFound) if a
    /// node is missing from `store`.
    pub fn commit_access(
        store: &mut MemoryStore,
        retrievals: &[FocalRetrieval],
        now: SimTime,
    ) -> Result<()> {
        let ids: BTreeSet<NodeId> = retrievals
            .iter()
            .flat_map(|r| r.nodes.iter().map(|n| n.id))
            .collect();
        for id in &ids {
            store.touch(*id, now)?;
        }
        debug!(touched = ids.len(), %now, "Committed retrieval access");
        Ok(())
    }

    /// Rank the non-idle nodes of `kinds` for every query, then mark all
    /// selected nodes as accessed at `now`.
    ///
    /// # Errors
    ///
    /// Propagates [`commit_access`](Self::commit_access) failures.
    pub fn retrieve(
        &self,
        store: &mut MemoryStore,
        kinds: &[NodeKind],
        queries: &[FocalQuery],
        k: usize,
        now: SimTime,
    ) -> Result<Vec<FocalRetrieval>> {
        let retrievals = {
            let candidates = store.non_idle(kinds);
            self.rank_many(&candidates, queries, k)
        };
        Self::commit_access(store, &retrievals, now)?;
        Ok(retrievals)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
