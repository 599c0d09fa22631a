//! Property-Based Tests for Reverie Core
//!
//! Uses `proptest` to check the store and ranking invariants under random
//! inputs: provenance stays acyclic, recency decays monotonically,
//! normalization spans the unit interval, and ranking is deterministic.

use chrono::{NaiveDate, TimeDelta};
use proptest::prelude::*;

use reverie_core::config::RetrievalConfig;
use reverie_core::memory::{MemoryStore, NewNode};
use reverie_core::retrieval::RankingEngine;
use reverie_core::retrieval::scoring::{min_max_normalize, recency_scores};
use reverie_core::types::{Embedding, NodeId, NodeKind, SimTime, Triple};
use reverie_core::ReverieError;

const DIMS: usize = 4;

fn at(minute: u32) -> SimTime {
    NaiveDate::from_ymd_opt(2023, 2, 13)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid time")
        + TimeDelta::minutes(i64::from(minute))
}

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_embedding() -> impl Strategy<Value = Embedding> {
    prop::collection::vec(-1.0..1.0f32, DIMS).prop_map(Embedding)
}

/// (created minute, importance, embedding)
fn arb_event() -> impl Strategy<Value = (u32, u32, Embedding)> {
    (0..10_000u32, 1..=10u32, arb_embedding())
}

fn event(minute: u32, importance: u32, embedding: Embedding, i: usize) -> NewNode {
    let desc = format!("Klaus Mueller noticed thing {i}");
    NewNode::event(
        at(minute),
        Triple::new("Klaus Mueller", "noticed", format!("thing {i}")),
        desc,
        importance,
        embedding,
    )
}

fn store_of(events: &[(u32, u32, Embedding)]) -> MemoryStore {
    let mut store = MemoryStore::new(DIMS);
    for (i, (minute, importance, embedding)) in events.iter().enumerate() {
        store
            .add(event(*minute, *importance, embedding.clone(), i))
            .expect("add event");
    }
    store
}

/// A write step: either an event, or a thought citing raw ids (which may
/// be unknown, self, or forward references).
#[derive(Debug, Clone)]
enum Step {
    Event(u32),
    Thought(Vec<u64>),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (1..=10u32).prop_map(Step::Event),
        prop::collection::vec(0..40u64, 1..4).prop_map(Step::Thought),
    ]
}

// ---------------------------------------------------------------------------
// Property: evidence only ever points backwards
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn evidence_never_points_forward(steps in prop::collection::vec(arb_step(), 1..40)) {
        let mut store = MemoryStore::new(DIMS);
        for (i, step) in steps.into_iter().enumerate() {
            let minute = u32::try_from(i).expect("small");
            let before = store.len();
            let next = store.peek_next_id();
            match step {
                Step::Event(importance) => {
                    store
                        .add(event(minute, importance, Embedding(vec![1.0; DIMS]), i))
                        .expect("events always insert");
                }
                Step::Thought(raw) => {
                    let evidence: Vec<NodeId> = raw.into_iter().map(NodeId).collect();
                    let valid = evidence.iter().all(|e| *e < next && store.get(*e).is_ok());
                    let result = store.add(NewNode::thought(
                        at(minute),
                        at(minute) + TimeDelta::days(30),
                        Triple::new("Klaus Mueller", "thinks", "about it"),
                        "Klaus Mueller thinks about it",
                        5,
                        Embedding(vec![0.5; DIMS]),
                        evidence,
                    ));
                    match result {
                        Ok(id) => prop_assert!(valid && id == next),
                        Err(ReverieError::InvalidEvidence { .. }) => {
                            prop_assert!(!valid);
                            prop_assert_eq!(store.len(), before);
                        }
                        Err(other) => prop_assert!(false, "unexpected error {other}"),
                    }
                }
            }
        }

        for node in store.nodes() {
            for evidence in &node.evidence {
                prop_assert!(*evidence < node.id);
                let cited = store.get(*evidence).expect("evidence exists");
                prop_assert!(cited.depth < node.depth);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Property: recency is non-increasing as last access gets older
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn recency_monotone_in_last_access(
        events in prop::collection::vec(arb_event(), 1..60),
        decay in 0.5..0.999f64,
    ) {
        let store = store_of(&events);
        let candidates = store.non_idle(&[NodeKind::Event]);
        let recency = recency_scores(&candidates, decay);

        for (i, a) in candidates.iter().enumerate() {
            prop_assert!(recency[i] > 0.0 && recency[i] <= 1.0);
            for (j, b) in candidates.iter().enumerate() {
                if a.last_accessed > b.last_accessed {
                    prop_assert!(recency[i] >= recency[j]);
                }
                if a.last_accessed == b.last_accessed {
                    prop_assert!((recency[i] - recency[j]).abs() < f64::EPSILON);
                }
            }
        }
        let newest = recency.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!((newest - 1.0).abs() < f64::EPSILON);
    }
}

// ---------------------------------------------------------------------------
// Property: min-max normalization spans [0, 1] exactly
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn normalization_spans_unit_interval(values in prop::collection::vec(-1_000.0..1_000.0f64, 2..50)) {
        let normalized = min_max_normalize(&values);
        prop_assert_eq!(normalized.len(), values.len());

        let distinct = values.iter().any(|v| (v - values[0]).abs() > f64::EPSILON);
        if distinct {
            let lo = normalized.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = normalized.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(lo.abs() < 1e-12);
            prop_assert!((hi - 1.0).abs() < 1e-12);
            prop_assert!(normalized.iter().all(|v| (0.0..=1.0).contains(v)));
        } else {
            prop_assert!(normalized.iter().all(|v| *v == 0.0));
        }
    }

    #[test]
    fn constant_values_normalize_to_zero(value in -1_000.0..1_000.0f64, len in 1..20usize) {
        prop_assert!(min_max_normalize(&vec![value; len]).iter().all(|v| *v == 0.0));
    }
}

// ---------------------------------------------------------------------------
// Property: ranking is deterministic, and retrieval reinforces recency
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn ranking_is_deterministic(
        events in prop::collection::vec(arb_event(), 1..40),
        query in arb_embedding(),
        k in 1..10usize,
    ) {
        let store = store_of(&events);
        let engine = RankingEngine::new(RetrievalConfig::default());
        let candidates = store.non_idle(&[NodeKind::Event]);

        let first = engine.rank(&candidates, &query, k);
        let second = engine.rank(&candidates, &query, k);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.len(), k.min(candidates.len()));
        for pair in first.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn retrieved_nodes_become_most_recent(
        events in prop::collection::vec(arb_event(), 2..30),
        query in arb_embedding(),
    ) {
        let mut store = store_of(&events);
        let engine = RankingEngine::new(RetrievalConfig::default());
        let focal = reverie_core::retrieval::FocalQuery { text: "q".into(), embedding: query };
        let now = at(20_000);

        let out = engine
            .retrieve(&mut store, &[NodeKind::Event], &[focal], 1, now)
            .expect("retrieve");
        let chosen = out[0].ids()[0];

        let candidates = store.non_idle(&[NodeKind::Event]);
        let recency = recency_scores(&candidates, 0.99);
        let idx = candidates.iter().position(|n| n.id == chosen).expect("chosen present");
        prop_assert!((recency[idx] - 1.0).abs() < f64::EPSILON);
    }
}

// ---------------------------------------------------------------------------
// Property: snapshots reload to the same nodes
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn snapshot_reload_is_exact(events in prop::collection::vec(arb_event(), 0..30)) {
        let store = store_of(&events);
        let json = serde_json::to_string(&store).expect("serialize");
        let restored: MemoryStore = serde_json::from_str(&json).expect("deserialize");

        prop_assert_eq!(restored.len(), store.len());
        for (a, b) in store.nodes().zip(restored.nodes()) {
            prop_assert_eq!(a, b);
        }
        prop_assert_eq!(restored.peek_next_id(), store.peek_next_id());
    }
}
