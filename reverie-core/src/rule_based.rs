//! Tier 0 cognition - deterministic, rule-based, zero latency.
//!
//! [`RuleBasedCognition`] answers every [`CognitionService`] request with
//! simple text heuristics and feature-hashed embeddings. It is the backend
//! when no LLM is configured, and because it never touches the network it
//! also drives replay runs and tests.
//!
//! Answers can be scripted per request (queued focal points and insight
//! mappings), individual operations can be made to fail, and every call is
//! counted, so a run can reproduce exactly what a live model once said.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::cognition::{CognitionService, PoignancyKind};
use crate::embedding::{EmbeddingProvider, HashEmbeddingProvider};
use crate::error::CognitionError;
use crate::types::{Embedding, Triple};

/// One kind of Cognition Service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CognitionOp {
    /// `focal_points`
    FocalPoints,
    /// `insights_and_evidence`
    Insights,
    /// `event_triple`
    Triple,
    /// `poignancy`
    Poignancy,
    /// `planning_thought`
    Planning,
    /// `memo_thought`
    Memo,
    /// `embedding`
    Embedding,
}

type Scripted<T> = Mutex<VecDeque<Result<T, CognitionError>>>;

/// Rule-based Cognition Service.
pub struct RuleBasedCognition {
    embedder: HashEmbeddingProvider,
    poignancy: u32,
    insight_delay: Option<Duration>,
    focal_script: Scripted<Vec<String>>,
    insight_script: Scripted<Value>,
    failures: Mutex<HashMap<CognitionOp, CognitionError>>,
    calls: Mutex<HashMap<CognitionOp, usize>>,
}

impl RuleBasedCognition {
    /// A service producing `dimensions`-long embeddings.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            embedder: HashEmbeddingProvider::new(dimensions),
            poignancy: 4,
            insight_delay: None,
            focal_script: Mutex::new(VecDeque::new()),
            insight_script: Mutex::new(VecDeque::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Score every non-idle description with `score`.
    #[must_use]
    pub fn with_poignancy(mut self, score: u32) -> Self {
        self.poignancy = score;
        self
    }

    /// Sleep for `delay` before answering each insight request.
    #[must_use]
    pub fn with_insight_delay(mut self, delay: Duration) -> Self {
        self.insight_delay = Some(delay);
        self
    }

    /// Queue the answer to the next focal-point request.
    pub fn script_focal_points(&self, answer: Result<Vec<String>, CognitionError>) {
        self.focal_script.lock().push_back(answer);
    }

    /// Queue the answer to the next insight request.
    pub fn script_insights(&self, answer: Result<Value, CognitionError>) {
        self.insight_script.lock().push_back(answer);
    }

    /// Make every subsequent `op` request fail with `error`.
    pub fn fail(&self, op: CognitionOp, error: CognitionError) {
        self.failures.lock().insert(op, error);
    }

    /// Stop failing `op` requests.
    pub fn recover(&self, op: CognitionOp) {
        self.failures.lock().remove(&op);
    }

    /// How many `op` requests have been made.
    #[must_use]
    pub fn calls(&self, op: CognitionOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    fn enter(&self, op: CognitionOp) -> Result<(), CognitionError> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        match self.failures.lock().get(&op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Non-empty lines, with a leading `"<n>. "` numbering stripped.
fn statements(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .map(|line| match line.split_once(". ") {
            Some((n, rest)) if n.chars().all(|c| c.is_ascii_digit()) && !n.is_empty() => rest,
            _ => line,
        })
        .filter(|line| !line.is_empty())
        .collect()
}

impl CognitionService for RuleBasedCognition {
    async fn focal_points(&self, statements_text: &str, n: usize) -> Result<Vec<String>, CognitionError> {
        self.enter(CognitionOp::FocalPoints)?;
        if let Some(answer) = self.focal_script.lock().pop_front() {
            return answer;
        }
        // Most recent statements first.
        Ok(statements(statements_text)
            .into_iter()
            .rev()
            .take(n)
            .map(str::to_string)
            .collect())
    }

    async fn insights_and_evidence(
        &self,
        numbered_statements: &str,
        n: usize,
    ) -> Result<Value, CognitionError> {
        self.enter(CognitionOp::Insights)?;
        if let Some(delay) = self.insight_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(answer) = self.insight_script.lock().pop_front() {
            return answer;
        }
        let mut map = Map::new();
        for (i, statement) in statements(numbered_statements).into_iter().enumerate().take(n) {
            map.insert(statement.to_string(), Value::from(vec![i]));
        }
        Ok(Value::Object(map))
    }

    async fn event_triple(&self, description: &str) -> Result<Triple, CognitionError> {
        self.enter(CognitionOp::Triple)?;
        let mut words = description.split_whitespace();
        let subject = words
            .next()
            .ok_or_else(|| CognitionError::Malformed("empty description".to_string()))?;
        let predicate = words.next().unwrap_or("is");
        let object: Vec<&str> = words.collect();
        let object = if object.is_empty() {
            subject.to_string()
        } else {
            object.join(" ")
        };
        Ok(Triple::new(subject, predicate, object))
    }

    async fn poignancy(&self, _kind: PoignancyKind, _description: &str) -> Result<u32, CognitionError> {
        self.enter(CognitionOp::Poignancy)?;
        Ok(self.poignancy)
    }

    async fn planning_thought(&self, transcript: &str) -> Result<String, CognitionError> {
        self.enter(CognitionOp::Planning)?;
        let last = transcript.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
        Ok(format!("remember to follow up on \"{}\"", last.trim()))
    }

    async fn memo_thought(&self, transcript: &str) -> Result<String, CognitionError> {
        self.enter(CognitionOp::Memo)?;
        let first = transcript.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        Ok(format!("talked about \"{}\"", first.trim()))
    }

    async fn embedding(&self, text: &str) -> Result<Embedding, CognitionError> {
        self.enter(CognitionOp::Embedding)?;
        self.embedder
            .embed(text)
            .map_err(|e| CognitionError::Unavailable(e.to_string()))
    }
}
