//! Memory nodes: the records held by the [`MemoryStore`](super::MemoryStore).
//!
//! A node is immutable once written except for `last_accessed`, which the
//! ranking engine bumps every time the node is selected.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{Embedding, NodeId, NodeKind, SimTime, Triple, Utterance, is_idle_key};

/// A single stored memory: an event, a thought, or a chat record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryNode {
    /// Unique identifier, assigned at creation.
    pub id: NodeId,
    /// What kind of memory this is.
    pub kind: NodeKind,
    /// When the memory was formed (simulation time).
    pub created_at: SimTime,
    /// When the memory stops being relevant. Thoughts expire, events usually do not.
    pub expiration: Option<SimTime>,
    /// Last time the node was returned by retrieval.
    pub last_accessed: SimTime,
    /// Compact semantic summary.
    pub triple: Triple,
    /// Natural-language statement of the memory.
    pub description: String,
    /// The text the embedding was computed from.
    pub embedding_key: String,
    /// Lower-cased keywords for keyword lookups.
    pub keywords: BTreeSet<String>,
    /// Poignancy score, nominally 1–10.
    pub importance: u32,
    /// Embedding of `embedding_key`.
    pub embedding: Embedding,
    /// Ids of the nodes that justify a thought, in the order they were cited.
    pub evidence: Vec<NodeId>,
    /// 0 for events and chats; `1 + max(evidence depth)` for thoughts.
    pub depth: u32,
    /// The conversation a chat node records. Empty for other kinds.
    #[serde(default)]
    pub transcript: Vec<Utterance>,
}

impl MemoryNode {
    /// Whether this node is an idle placeholder.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        is_idle_key(&self.embedding_key)
    }

    /// Whether the node has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: SimTime) -> bool {
        self.expiration.is_some_and(|exp| now >= exp)
    }
}

/// Everything needed to write a new node; the store assigns id, depth and
/// `last_accessed`.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub(crate) kind: NodeKind,
    pub(crate) created: SimTime,
    pub(crate) expiration: Option<SimTime>,
    pub(crate) triple: Triple,
    pub(crate) description: String,
    pub(crate) embedding_key: String,
    pub(crate) keywords: BTreeSet<String>,
    pub(crate) importance: u32,
    pub(crate) embedding: Embedding,
    pub(crate) evidence: Vec<NodeId>,
    pub(crate) transcript: Vec<Utterance>,
    pub(crate) allow_empty_evidence: bool,
}

impl NewNode {
    fn base(
        kind: NodeKind,
        created: SimTime,
        triple: Triple,
        description: String,
        importance: u32,
        embedding: Embedding,
    ) -> Self {
        let keywords = triple.keywords().into_iter().collect();
        Self {
            kind,
            created,
            expiration: None,
            triple,
            embedding_key: description.clone(),
            description,
            keywords,
            importance,
            embedding,
            evidence: Vec::new(),
            transcript: Vec::new(),
            allow_empty_evidence: false,
        }
    }

    /// A perceived event.
    #[must_use]
    pub fn event(
        created: SimTime,
        triple: Triple,
        description: impl Into<String>,
        importance: u32,
        embedding: Embedding,
    ) -> Self {
        Self::base(NodeKind::Event, created, triple, description.into(), importance, embedding)
    }

    /// A derived thought citing `evidence`.
    #[must_use]
    pub fn thought(
        created: SimTime,
        expiration: SimTime,
        triple: Triple,
        description: impl Into<String>,
        importance: u32,
        embedding: Embedding,
        evidence: Vec<NodeId>,
    ) -> Self {
        let mut node =
            Self::base(NodeKind::Thought, created, triple, description.into(), importance, embedding);
        node.expiration = Some(expiration);
        node.evidence = evidence;
        node
    }

    /// A conversation record.
    #[must_use]
    pub fn chat(
        created: SimTime,
        triple: Triple,
        description: impl Into<String>,
        importance: u32,
        embedding: Embedding,
        transcript: Vec<Utterance>,
    ) -> Self {
        let mut node =
            Self::base(NodeKind::Chat, created, triple, description.into(), importance, embedding);
        node.transcript = transcript;
        node
    }

    /// Set an expiration time.
    #[must_use]
    pub fn with_expiration(mut self, expiration: SimTime) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Use a different text as the embedding key (defaults to the description).
    #[must_use]
    pub fn with_embedding_key(mut self, key: impl Into<String>) -> Self {
        self.embedding_key = key.into();
        self
    }

    /// Add extra keywords on top of those derived from the triple.
    #[must_use]
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keywords
            .extend(keywords.into_iter().map(|k| k.as_ref().trim().to_lowercase()));
        self.keywords.remove("");
        self
    }

    /// Permit a thought with no evidence (placeholder insights).
    #[must_use]
    pub fn allow_empty_evidence(mut self) -> Self {
        self.allow_empty_evidence = true;
        self
    }

    /// The kind of node this will become.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The evidence the node will cite.
    #[must_use]
    pub fn evidence(&self) -> &[NodeId] {
        &self.evidence
    }

    /// The description the node will carry.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}
