//! Reflection: distilling many low-level memories into higher-level thoughts.
//!
//! A [`ReflectionCounter`] counts down from `importance_threshold_max` as the
//! perception pipeline records the importance of each new node. Once it
//! reaches zero (and there is something to reflect on), a reflection pass:
//!
//! 1. asks the Cognition Service for focal points over the most recently
//!    accessed statements,
//! 2. ranks the store against each focal point with an equal-weight blend,
//! 3. asks for insights with evidence indices over each ranked set,
//! 4. turns every insight into a thought node citing its evidence.
//!
//! The pass is staged: thoughts and access updates are committed only after
//! every fatal step succeeded, so a failed pass leaves the store and the
//! counter untouched and the trigger fires again on the next tick. Bad
//! insight answers are the one recoverable failure; they degrade to a single
//! evidence-free placeholder thought.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cognition::{CognitionService, compose_thought, embed_cached};
use crate::config::{ReflectionConfig, RetrievalWeights, ReverieConfig};
use crate::error::{CognitionError, Result};
use crate::memory::{MemoryNode, MemoryStore, NewNode};
use crate::retrieval::{FocalQuery, RankingEngine};
use crate::types::{NodeId, NodeKind, SimTime};

/// Statement written when an insight answer cannot be used.
pub const PLACEHOLDER_INSIGHT: &str = "this is blank";

// ---------------------------------------------------------------------------
// Counter state
// ---------------------------------------------------------------------------

/// Per-character reflection trigger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionCounter {
    /// Importance budget left before the next reflection. Counts down and
    /// may go negative.
    pub accumulated_importance: i32,
    /// Level the budget is reset to after each reflection.
    pub importance_threshold_max: i32,
    /// Number of nodes recorded since the last reflection; bounds how many
    /// recent statements feed focal-point generation (0 means all).
    pub recency_window_cap: usize,
}

impl ReflectionCounter {
    /// A fresh counter with a full budget.
    #[must_use]
    pub fn new(importance_threshold_max: i32) -> Self {
        Self {
            accumulated_importance: importance_threshold_max,
            importance_threshold_max,
            recency_window_cap: 0,
        }
    }

    /// Record a newly perceived event's importance.
    pub fn record(&mut self, importance: u32) {
        let importance = i32::try_from(importance).unwrap_or(i32::MAX);
        self.accumulated_importance = self.accumulated_importance.saturating_sub(importance);
        self.recency_window_cap += 1;
    }

    /// Whether a reflection should run now.
    #[must_use]
    pub fn should_reflect(&self, store: &MemoryStore) -> bool {
        self.accumulated_importance <= 0
            && store.count(NodeKind::Event) + store.count(NodeKind::Thought) > 0
    }

    /// Restore the full budget and clear the recency window.
    pub fn reset(&mut self) {
        self.accumulated_importance = self.importance_threshold_max;
        self.recency_window_cap = 0;
    }
}

impl Default for ReflectionCounter {
    fn default() -> Self {
        Self::new(ReflectionConfig::default().importance_threshold_max)
    }
}

// ---------------------------------------------------------------------------
// Insights
// ---------------------------------------------------------------------------

/// A validated insight with its evidence translated to node ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insight {
    /// The insight statement.
    pub statement: String,
    /// Supporting node ids, in the order cited (duplicates removed).
    pub evidence: Vec<NodeId>,
}

impl Insight {
    /// The evidence-free placeholder written when insight generation fails.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            statement: PLACEHOLDER_INSIGHT.to_string(),
            evidence: Vec::new(),
        }
    }
}

/// Validate a raw `insight → [index]` mapping against the numbered
/// statements it was generated from, translating indices into node ids.
///
/// Any schema violation rejects the whole answer: a non-object or empty
/// mapping, a blank insight, evidence that is not a non-empty array, or an
/// index that is not a non-negative integer within range. At most `max`
/// insights are kept, in answer order.
///
/// # Errors
///
/// Returns [`CognitionError::Malformed`] describing the first violation.
pub fn validate_insights(
    raw: &Value,
    numbered: &[NodeId],
    max: usize,
) -> std::result::Result<Vec<Insight>, CognitionError> {
    let malformed = |why: String| CognitionError::Malformed(why);

    let map = raw
        .as_object()
        .ok_or_else(|| malformed(format!("expected a mapping, got {raw}")))?;
    if map.is_empty() {
        return Err(malformed("empty insight mapping".to_string()));
    }

    let mut insights = Vec::new();
    for (statement, indices) in map.iter().take(max) {
        let statement = statement.trim();
        if statement.is_empty() {
            return Err(malformed("blank insight statement".to_string()));
        }
        let indices = indices
            .as_array()
            .ok_or_else(|| malformed(format!("evidence for '{statement}' is not a list")))?;
        if indices.is_empty() {
            return Err(malformed(format!("no evidence cited for '{statement}'")));
        }

        let mut evidence = Vec::with_capacity(indices.len());
        for index in indices {
            let id = index
                .as_u64()
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| numbered.get(i))
                .ok_or_else(|| {
                    malformed(format!(
                        "evidence index {index} out of range for {} statements",
                        numbered.len()
                    ))
                })?;
            if !evidence.contains(id) {
                evidence.push(*id);
            }
        }
        insights.push(Insight {
            statement: statement.to_string(),
            evidence,
        });
    }
    Ok(insights)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// What a reflection pass produced.
#[derive(Debug, Clone, Default)]
pub struct ReflectionOutcome {
    /// Focal points the pass reflected on.
    pub focal_points: Vec<String>,
    /// Thought nodes written, in creation order.
    pub thoughts: Vec<NodeId>,
    /// How many focal points fell back to the placeholder insight.
    pub degraded: usize,
}

/// Runs reflection passes for one character at a time.
#[derive(Debug, Clone)]
pub struct ReflectionEngine {
    config: ReflectionConfig,
    ranking: RankingEngine,
    thought_lifetime: TimeDelta,
}

impl ReflectionEngine {
    /// Build an engine from the full configuration. Focal-point retrieval
    /// always uses an equal-weight blend.
    #[must_use]
    pub fn new(config: &ReverieConfig) -> Self {
        Self {
            config: config.reflection.clone(),
            ranking: RankingEngine::new(config.retrieval.clone())
                .with_weights(RetrievalWeights::EQUAL),
            thought_lifetime: TimeDelta::days(config.memory.thought_lifetime_days),
        }
    }

    /// Check the trigger and, if it fires, run a reflection pass and reset
    /// the counter. Returns `None` when no reflection was due.
    ///
    /// # Errors
    ///
    /// Failures in focal-point generation, triple extraction, poignancy
    /// scoring or embedding propagate; the store and counter are then left
    /// exactly as they were.
    pub async fn reflect<C: CognitionService>(
        &self,
        store: &mut MemoryStore,
        counter: &mut ReflectionCounter,
        cognition: &C,
        now: SimTime,
    ) -> Result<Option<ReflectionOutcome>> {
        if !counter.should_reflect(store) {
            return Ok(None);
        }
        info!(
            budget = counter.accumulated_importance,
            window = counter.recency_window_cap,
            "Reflection triggered"
        );

        let outcome = self.run_reflection(store, counter, cognition, now).await?;
        counter.reset();

        info!(
            focal_points = outcome.focal_points.len(),
            thoughts = outcome.thoughts.len(),
            degraded = outcome.degraded,
            "Reflection complete"
        );
        Ok(Some(outcome))
    }

    /// Run one reflection pass unconditionally. Does not reset the counter.
    ///
    /// # Errors
    ///
    /// See [`reflect`](Self::reflect).
    pub async fn run_reflection<C: CognitionService>(
        &self,
        store: &mut MemoryStore,
        counter: &ReflectionCounter,
        cognition: &C,
        now: SimTime,
    ) -> Result<ReflectionOutcome> {
        let view: &MemoryStore = store;

        let statements = focal_statements(view, counter.recency_window_cap);
        let focal_points = cognition
            .focal_points(&statements, self.config.focal_point_count)
            .await?;
        let focal_points: Vec<String> = focal_points
            .into_iter()
            .take(self.config.focal_point_count)
            .collect();

        let mut queries = Vec::with_capacity(focal_points.len());
        for text in &focal_points {
            let embedding = embed_cached(view, cognition, text).await?;
            queries.push(FocalQuery {
                text: text.clone(),
                embedding,
            });
        }

        let retrievals = {
            let candidates = view.non_idle(&[NodeKind::Event, NodeKind::Thought]);
            self.ranking
                .rank_many(&candidates, &queries, self.ranking.top_k())
        };

        let mut degraded = 0;
        let mut pending: Vec<NewNode> = Vec::new();
        for retrieval in &retrievals {
            let ids = retrieval.ids();
            let nodes: Vec<&MemoryNode> = ids.iter().filter_map(|id| view.get(*id).ok()).collect();
            debug!(
                focal_point = %retrieval.focal_point,
                retrieved = nodes.len(),
                "Generating insights"
            );

            let insights = match self.generate_insights(cognition, &nodes).await {
                Ok(insights) => insights,
                Err(e) => {
                    warn!(
                        focal_point = %retrieval.focal_point,
                        error = %e,
                        "Insight generation failed, writing placeholder thought"
                    );
                    degraded += 1;
                    vec![Insight::placeholder()]
                }
            };

            for insight in insights {
                let node = compose_thought(
                    view,
                    cognition,
                    now,
                    self.thought_lifetime,
                    &insight.statement,
                    insight.evidence,
                )
                .await?;
                pending.push(node);
            }
        }

        let thoughts = store.add_all(pending)?;
        RankingEngine::commit_access(store, &retrievals, now)?;

        Ok(ReflectionOutcome {
            focal_points,
            thoughts,
            degraded,
        })
    }

    async fn generate_insights<C: CognitionService>(
        &self,
        cognition: &C,
        nodes: &[&MemoryNode],
    ) -> std::result::Result<Vec<Insight>, CognitionError> {
        let mut numbered = String::new();
        for (i, node) in nodes.iter().enumerate() {
            let _ = writeln!(numbered, "{i}. {}", node.embedding_key);
        }
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();

        let timeout_ms = self.config.insight_timeout_ms;
        let raw = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            cognition.insights_and_evidence(&numbered, self.config.insights_per_focal_point),
        )
        .await
        .map_err(|_| CognitionError::Timeout(timeout_ms))??;

        validate_insights(&raw, &ids, self.config.insights_per_focal_point)
    }
}

/// The embedding keys of the most recently accessed non-idle events and
/// thoughts, oldest first, one per line. At most `window` statements are
/// used; a window of 0 uses all of them.
#[must_use]
pub fn focal_statements(store: &MemoryStore, window: usize) -> String {
    let mut nodes = store.non_idle(&[NodeKind::Event, NodeKind::Thought]);
    nodes.sort_by_key(|n| (n.last_accessed, n.id));

    let skip = if window == 0 {
        0
    } else {
        nodes.len().saturating_sub(window)
    };

    let mut statements = String::new();
    for node in &nodes[skip..] {
        statements.push_str(&node.embedding_key);
        statements.push('\n');
    }
    statements
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counter_counts_down_and_resets() {
        let mut counter = ReflectionCounter::new(150);
        counter.record(60);
        counter.record(50);
        assert_eq!(counter.accumulated_importance, 40);
        counter.record(45);
        assert_eq!(counter.accumulated_importance, -5);
        assert_eq!(counter.recency_window_cap, 3);
        counter.reset();
        assert_eq!(counter.accumulated_importance, 150);
        assert_eq!(counter.recency_window_cap, 0);
    }

    #[test]
    fn counter_does_not_fire_on_empty_store() {
        let mut counter = ReflectionCounter::new(1);
        counter.record(5);
        assert!(!counter.should_reflect(&MemoryStore::new(2)));
    }

    #[test]
    fn validation_translates_indices() {
        let ids = [NodeId(4), NodeId(7), NodeId(9)];
        let raw = json!({
            "Klaus is devoted to research": [0, 2, 2],
            "Klaus enjoys the cafe": [1],
        });
        let insights = validate_insights(&raw, &ids, 5).expect("valid");
        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0].statement, "Klaus is devoted to research");
        assert_eq!(insights[0].evidence, vec![NodeId(4), NodeId(9)]);
        assert_eq!(insights[1].evidence, vec![NodeId(7)]);
    }

    #[test]
    fn validation_caps_insight_count() {
        let ids = [NodeId(1)];
        let raw = json!({"a": [0], "b": [0], "c": [0]});
        assert_eq!(validate_insights(&raw, &ids, 2).expect("valid").len(), 2);
    }

    #[test]
    fn validation_rejects_schema_violations() {
        let ids = [NodeId(1), NodeId(2)];
        let cases = [
            json!(["not", "a", "mapping"]),
            json!("a string"),
            json!({}),
            json!({"  ": [0]}),
            json!({"insight": 0}),
            json!({"insight": []}),
            json!({"insight": [5]}),
            json!({"insight": [-1]}),
            json!({"insight": [0.5]}),
            json!({"insight": ["0"]}),
        ];
        for raw in cases {
            assert!(
                matches!(validate_insights(&raw, &ids, 5), Err(CognitionError::Malformed(_))),
                "should reject {raw}"
            );
        }
    }

    #[test]
    fn focal_statements_keep_most_recent_window() {
        use crate::memory::NewNode;
        use crate::types::{Embedding, Triple};
        use chrono::NaiveDate;

        let base = NaiveDate::from_ymd_opt(2023, 2, 13)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .expect("valid time");
        let mut store = MemoryStore::new(1);
        for (i, desc) in ["woke up", "is idle", "made coffee", "read paper"].iter().enumerate() {
            store
                .add(NewNode::event(
                    base + TimeDelta::minutes(i64::try_from(i).expect("small")),
                    Triple::new("Klaus", "did", *desc),
                    *desc,
                    3,
                    Embedding(vec![1.0]),
                ))
                .expect("add");
        }
        assert_eq!(focal_statements(&store, 2), "made coffee\nread paper\n");
        assert_eq!(focal_statements(&store, 0), "woke up\nmade coffee\nread paper\n");
    }

    mod engine {
        use super::super::*;
        use crate::cognition::CognitionService;
        use crate::rule_based::{CognitionOp, RuleBasedCognition};
        use crate::types::{Embedding, Triple};
        use chrono::NaiveDate;
        use serde_json::json;

        const DIMS: usize = 16;

        fn t(hour: u32) -> SimTime {
            NaiveDate::from_ymd_opt(2023, 2, 13)
                .and_then(|d| d.and_hms_opt(hour, 0, 0))
                .expect("valid time")
        }

        fn config() -> ReverieConfig {
            let mut config = ReverieConfig::default();
            config.memory.embedding_dimensions = DIMS;
            config
        }

        async fn seeded(cognition: &RuleBasedCognition) -> (MemoryStore, ReflectionCounter) {
            let mut store = MemoryStore::new(DIMS);
            let mut counter = ReflectionCounter::new(150);
            for (i, (desc, importance)) in [
                ("Klaus Mueller is reading about gentrification", 60),
                ("Klaus Mueller is writing his research paper", 50),
                ("Klaus Mueller is eating lunch at Hobbs Cafe", 45),
            ]
            .into_iter()
            .enumerate()
            {
                let embedding = cognition.embedding(desc).await.expect("embed");
                let hour = 8 + u32::try_from(i).expect("small");
                store
                    .add(NewNode::event(
                        t(hour),
                        Triple::new("Klaus Mueller", "is", desc),
                        desc,
                        importance,
                        embedding,
                    ))
                    .expect("add");
                counter.record(importance);
            }
            (store, counter)
        }

        #[tokio::test]
        async fn fires_once_budget_is_spent_and_resets() {
            let cognition = RuleBasedCognition::new(DIMS);
            let (mut store, mut counter) = seeded(&cognition).await;
            assert_eq!(counter.accumulated_importance, -5);

            let engine = ReflectionEngine::new(&config());
            let outcome = engine
                .reflect(&mut store, &mut counter, &cognition, t(12))
                .await
                .expect("reflect")
                .expect("should fire");

            assert_eq!(outcome.focal_points.len(), 3);
            assert!(!outcome.thoughts.is_empty());
            assert_eq!(outcome.degraded, 0);
            assert_eq!(counter.accumulated_importance, 150);
            assert_eq!(counter.recency_window_cap, 0);

            for id in &outcome.thoughts {
                let thought = store.get(*id).expect("thought");
                assert_eq!(thought.kind, NodeKind::Thought);
                assert!(!thought.evidence.is_empty());
                assert!(thought.evidence.iter().all(|e| e < id));
                assert_eq!(thought.expiration, Some(t(12) + TimeDelta::days(30)));
            }
            // Retrieved evidence was marked as accessed.
            assert!(store.sequence(NodeKind::Event).iter().any(|n| n.last_accessed == t(12)));

            let again = engine
                .reflect(&mut store, &mut counter, &cognition, t(13))
                .await
                .expect("reflect");
            assert!(again.is_none());
        }

        #[tokio::test]
        async fn malformed_insights_degrade_to_placeholder() {
            let cognition = RuleBasedCognition::new(DIMS);
            let (mut store, mut counter) = seeded(&cognition).await;
            cognition.script_focal_points(Ok(vec!["Klaus Mueller research".to_string()]));
            cognition.script_insights(Ok(json!(["not", "a", "mapping"])));

            let before = store.len();
            let outcome = ReflectionEngine::new(&config())
                .reflect(&mut store, &mut counter, &cognition, t(12))
                .await
                .expect("reflect")
                .expect("should fire");

            assert_eq!(outcome.degraded, 1);
            assert_eq!(outcome.thoughts.len(), 1);
            assert_eq!(store.len(), before + 1);
            let placeholder = store.get(outcome.thoughts[0]).expect("placeholder");
            assert_eq!(placeholder.description, PLACEHOLDER_INSIGHT);
            assert!(placeholder.evidence.is_empty());
            assert_eq!(counter.accumulated_importance, 150);
        }

        #[tokio::test]
        async fn failed_pass_leaves_store_and_counter_untouched() {
            let cognition = RuleBasedCognition::new(DIMS);
            let (mut store, mut counter) = seeded(&cognition).await;
            cognition.fail(CognitionOp::Triple, CognitionError::Unavailable("offline".into()));

            let snapshot: Vec<_> = store.nodes().cloned().collect();
            let counter_before = counter.clone();
            let result = ReflectionEngine::new(&config())
                .reflect(&mut store, &mut counter, &cognition, t(12))
                .await;

            assert!(result.is_err());
            assert_eq!(store.nodes().cloned().collect::<Vec<_>>(), snapshot);
            assert_eq!(counter, counter_before);
            assert!(counter.should_reflect(&store), "retries on the next tick");
        }

        #[tokio::test]
        async fn rejected_commit_leaves_access_times_untouched() {
            let cognition = RuleBasedCognition::new(DIMS);
            let (mut store, mut counter) = seeded(&cognition).await;
            let mut config = config();
            config.memory.thought_lifetime_days = 0;

            let snapshot: Vec<_> = store.nodes().cloned().collect();
            let result = ReflectionEngine::new(&config)
                .reflect(&mut store, &mut counter, &cognition, t(12))
                .await;

            assert!(matches!(result, Err(crate::ReverieError::InvalidNode(_))));
            assert_eq!(store.nodes().cloned().collect::<Vec<_>>(), snapshot);
            assert!(store.nodes().all(|n| n.last_accessed < t(12)));
            assert_eq!(counter.accumulated_importance, -5);
        }

        #[tokio::test]
        async fn focal_point_failure_is_fatal() {
            let cognition = RuleBasedCognition::new(DIMS);
            let (mut store, mut counter) = seeded(&cognition).await;
            cognition.script_focal_points(Err(CognitionError::Unavailable("offline".into())));

            let result = ReflectionEngine::new(&config())
                .reflect(&mut store, &mut counter, &cognition, t(12))
                .await;
            assert!(matches!(result, Err(crate::ReverieError::Cognition(_))));
            assert_eq!(store.count(NodeKind::Thought), 0);
            assert_eq!(cognition.calls(CognitionOp::Insights), 0);
        }

        #[tokio::test(start_paused = true)]
        async fn slow_insights_time_out_to_placeholder() {
            let cognition = RuleBasedCognition::new(DIMS).with_insight_delay(std::time::Duration::from_secs(60));
            let (mut store, mut counter) = seeded(&cognition).await;
            cognition.script_focal_points(Ok(vec!["lunch".to_string()]));

            let outcome = ReflectionEngine::new(&config())
                .reflect(&mut store, &mut counter, &cognition, t(12))
                .await
                .expect("reflect")
                .expect("should fire");
            assert_eq!(outcome.degraded, 1);
            let thought = store.get(outcome.thoughts[0]).expect("thought");
            assert_eq!(thought.description, PLACEHOLDER_INSIGHT);
        }

        #[tokio::test]
        async fn idle_events_are_not_reflected_on() {
            let cognition = RuleBasedCognition::new(DIMS);
            let mut store = MemoryStore::new(DIMS);
            store
                .add(NewNode::event(
                    t(8),
                    Triple::new("Klaus Mueller", "is", "idle"),
                    "Klaus Mueller is idle",
                    1,
                    Embedding(vec![0.0; DIMS]),
                ))
                .expect("add");
            let counter = ReflectionCounter::new(0);

            let outcome = ReflectionEngine::new(&config())
                .run_reflection(&mut store, &counter, &cognition, t(9))
                .await
                .expect("reflect");
            assert!(outcome.focal_points.is_empty());
            assert!(outcome.thoughts.is_empty());
        }
    }
}
