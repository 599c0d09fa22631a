//! The Cognition Service boundary.
//!
//! Language understanding and generation are delegated to an external
//! collaborator. The core only depends on this trait; `reverie-llm` provides
//! the LLM-backed implementation. Every call is awaited at a single point, so
//! reflection steps run strictly in sequence. Bounding latency (timeouts,
//! retries) is the implementation's job.

use chrono::TimeDelta;

use crate::error::CognitionError;
use crate::memory::{MemoryStore, NewNode};
use crate::types::{Embedding, NodeId, SimTime, Triple};

/// Which prompt context a poignancy request is scored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoignancyKind {
    /// Something that happened.
    Event,
    /// A derived thought.
    Thought,
    /// A conversation.
    Chat,
}

/// Structured request/response operations the core needs from the
/// text-generation and embedding collaborator.
#[allow(async_fn_in_trait)]
pub trait CognitionService {
    /// Up to `n` short statements naming what to reflect on, given one
    /// statement per line.
    async fn focal_points(&self, statements: &str, n: usize) -> Result<Vec<String>, CognitionError>;

    /// Up to `n` insights, as the raw mapping `insight → [evidence index]`
    /// over a 0-based numbered statement list. Validation happens in the
    /// reflection engine.
    async fn insights_and_evidence(
        &self,
        numbered_statements: &str,
        n: usize,
    ) -> Result<serde_json::Value, CognitionError>;

    /// A `(subject, predicate, object)` summary of a description.
    async fn event_triple(&self, description: &str) -> Result<Triple, CognitionError>;

    /// Importance of a description on a 1–10 scale, in the given context.
    async fn poignancy(&self, kind: PoignancyKind, description: &str) -> Result<u32, CognitionError>;

    /// A forward-looking planning note about a conversation transcript.
    async fn planning_thought(&self, transcript: &str) -> Result<String, CognitionError>;

    /// A reflective memo about a conversation transcript.
    async fn memo_thought(&self, transcript: &str) -> Result<String, CognitionError>;

    /// Embedding of `text`.
    async fn embedding(&self, text: &str) -> Result<Embedding, CognitionError>;
}

/// Score a description's importance. Idle descriptions short-circuit to 1
/// without calling the service.
///
/// # Errors
///
/// Propagates the service's error.
pub async fn score_poignancy<C: CognitionService>(
    cognition: &C,
    kind: PoignancyKind,
    description: &str,
) -> Result<u32, CognitionError> {
    if description.contains("is idle") {
        return Ok(1);
    }
    cognition.poignancy(kind, description).await
}

/// Reuse the store's embedding for identical text, or ask the service.
///
/// # Errors
///
/// Propagates the service's error.
pub async fn embed_cached<C: CognitionService>(
    store: &MemoryStore,
    cognition: &C,
    text: &str,
) -> Result<Embedding, CognitionError> {
    if let Some(embedding) = store.cached_embedding(text) {
        return Ok(embedding.clone());
    }
    cognition.embedding(text).await
}

/// Build a thought node for `description`: triple, thought-context
/// poignancy and embedding from the service, expiring `lifetime` after
/// `created`. An empty `evidence` list marks a placeholder thought.
///
/// # Errors
///
/// Any failing service call is returned unchanged.
pub async fn compose_thought<C: CognitionService>(
    store: &MemoryStore,
    cognition: &C,
    created: SimTime,
    lifetime: TimeDelta,
    description: &str,
    evidence: Vec<NodeId>,
) -> Result<NewNode, CognitionError> {
    let triple = cognition.event_triple(description).await?;
    let importance = score_poignancy(cognition, PoignancyKind::Thought, description).await?;
    let embedding = embed_cached(store, cognition, description).await?;

    let placeholder = evidence.is_empty();
    let node = NewNode::thought(
        created,
        created + lifetime,
        triple,
        description,
        importance,
        embedding,
        evidence,
    );
    Ok(if placeholder {
        node.allow_empty_evidence()
    } else {
        node
    })
}
