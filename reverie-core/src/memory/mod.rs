//! The Memory Store: one character's append-only collection of memory nodes.
//!
//! Storage is arena-style: a flat table keyed by [`NodeId`], with evidence
//! kept as id lists. Per-kind sequences preserve creation order, and two
//! secondary indices are maintained on every write:
//!
//! - keyword → node ids (per kind), for associative recall
//! - normalized embedding key → node id, so identical descriptions reuse
//!   one embedding
//!
//! Indices are never serialized; a snapshot carries only the nodes and is
//! re-indexed (and re-validated) on load.

pub mod node;

pub use node::{MemoryNode, NewNode};

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::error::{Result, ReverieError};
use crate::types::{Embedding, NodeId, NodeKind, SimTime, Triple, normalize_key};

/// An append-only, indexed store of memory nodes for a single character.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "StoreSnapshot")]
pub struct MemoryStore {
    dimensions: usize,
    next_id: u64,
    nodes: BTreeMap<NodeId, MemoryNode>,
    sequences: HashMap<NodeKind, Vec<NodeId>>,
    keyword_index: HashMap<(NodeKind, String), Vec<NodeId>>,
    embedding_index: HashMap<String, NodeId>,
}

impl MemoryStore {
    /// Create an empty store whose nodes all carry `dimensions`-long embeddings.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            next_id: 1,
            nodes: BTreeMap::new(),
            sequences: HashMap::new(),
            keyword_index: HashMap::new(),
            embedding_index: HashMap::new(),
        }
    }

    /// Embedding dimensionality enforced by this store.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Total number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the store holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The id the next added node will receive.
    #[must_use]
    pub fn peek_next_id(&self) -> NodeId {
        NodeId(self.next_id)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Validate and append a new node, returning its fresh id.
    ///
    /// # Errors
    ///
    /// - [`ReverieError::InvalidEvidence`] if an evidence id is unknown,
    ///   refers to the new node itself, or points forward (which would close
    ///   a cycle in the provenance graph).
    /// - [`ReverieError::InvalidNode`] if the embedding has the wrong
    ///   dimensionality, the expiration is not after creation, a thought has
    ///   no evidence without permission, or an event/chat carries evidence.
    pub fn add(&mut self, new: NewNode) -> Result<NodeId> {
        let id = NodeId(self.next_id);
        self.validate(id, &new)?;

        let depth = if new.kind == NodeKind::Thought {
            new.evidence
                .iter()
                .filter_map(|e| self.nodes.get(e))
                .map(|n| n.depth + 1)
                .max()
                .unwrap_or(0)
        } else {
            0
        };

        let node = MemoryNode {
            id,
            kind: new.kind,
            created_at: new.created,
            expiration: new.expiration,
            last_accessed: new.created,
            triple: new.triple,
            description: new.description,
            embedding_key: new.embedding_key,
            keywords: new.keywords,
            importance: new.importance,
            embedding: new.embedding,
            evidence: new.evidence,
            depth,
            transcript: new.transcript,
        };

        debug!(
            node = %id,
            kind = %node.kind,
            importance = node.importance,
            evidence = node.evidence.len(),
            "Added memory node"
        );

        self.index(node);
        self.next_id += 1;
        Ok(id)
    }

    /// Append a batch of nodes all-or-nothing: every node is validated
    /// before any is written. A node may cite nodes already in the store
    /// and earlier nodes of the same batch.
    ///
    /// # Errors
    ///
    /// The first validation failure; nothing is written in that case.
    pub fn add_all(&mut self, batch: Vec<NewNode>) -> Result<Vec<NodeId>> {
        for (offset, new) in (0u64..).zip(&batch) {
            self.validate(NodeId(self.next_id + offset), new)?;
        }
        batch.into_iter().map(|new| self.add(new)).collect()
    }

    fn validate(&self, id: NodeId, new: &NewNode) -> Result<()> {
        if new.embedding.dimensions() != self.dimensions {
            return Err(ReverieError::InvalidNode(format!(
                "embedding has {} dimensions, store expects {}",
                new.embedding.dimensions(),
                self.dimensions
            )));
        }
        if let Some(exp) = new.expiration {
            if exp <= new.created {
                return Err(ReverieError::InvalidNode(format!(
                    "expiration {exp} is not after creation {}",
                    new.created
                )));
            }
        }
        match new.kind {
            NodeKind::Thought => {
                if new.evidence.is_empty() && !new.allow_empty_evidence {
                    return Err(ReverieError::InvalidNode(
                        "thought carries no evidence".to_string(),
                    ));
                }
            }
            NodeKind::Event | NodeKind::Chat => {
                if !new.evidence.is_empty() {
                    return Err(ReverieError::InvalidNode(format!(
                        "{} nodes cannot cite evidence",
                        new.kind
                    )));
                }
            }
        }
        // Ids between next_id and id belong to earlier nodes of a batch.
        for &evidence in &new.evidence {
            let staged = evidence.0 >= self.next_id && evidence < id;
            check_evidence(id, evidence, staged || self.nodes.contains_key(&evidence))?;
        }
        Ok(())
    }

    fn index(&mut self, node: MemoryNode) {
        let id = node.id;
        let kind = node.kind;
        self.sequences.entry(kind).or_default().push(id);

        for keyword in &node.keywords {
            self.keyword_index
                .entry((kind, keyword.clone()))
                .or_default()
                .push(id);
        }

        self.embedding_index
            .insert(normalize_key(&node.embedding_key), id);
        self.nodes.insert(id, node);
    }

    /// Set `last_accessed` of a node. Only the ranking engine calls this.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::NotFound`] if the node does not exist.
    pub(crate) fn touch(&mut self, id: NodeId, when: SimTime) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or(ReverieError::NotFound(id))?;
        node.last_accessed = when;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Look up a node by id.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::NotFound`] if the node does not exist.
    pub fn get(&self, id: NodeId) -> Result<&MemoryNode> {
        self.nodes.get(&id).ok_or(ReverieError::NotFound(id))
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &MemoryNode> {
        self.nodes.values()
    }

    /// Nodes of one kind, in creation order.
    #[must_use]
    pub fn sequence(&self, kind: NodeKind) -> Vec<&MemoryNode> {
        self.sequences
            .get(&kind)
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    /// Number of nodes of one kind.
    #[must_use]
    pub fn count(&self, kind: NodeKind) -> usize {
        self.sequences.get(&kind).map_or(0, Vec::len)
    }

    /// Non-idle nodes of the given kinds, in creation order per kind.
    /// This is the usual candidate universe for ranking.
    #[must_use]
    pub fn non_idle(&self, kinds: &[NodeKind]) -> Vec<&MemoryNode> {
        kinds
            .iter()
            .flat_map(|&kind| self.sequence(kind))
            .filter(|node| !node.is_idle())
            .collect()
    }

    /// The most recent node of `kind` matching `filter`, if any.
    pub fn last_of_kind_with<F>(&self, kind: NodeKind, mut filter: F) -> Option<&MemoryNode>
    where
        F: FnMut(&MemoryNode) -> bool,
    {
        self.sequences
            .get(&kind)?
            .iter()
            .rev()
            .filter_map(|id| self.nodes.get(id))
            .find(|node| filter(node))
    }

    /// The most recent chat node involving `counterpart`.
    #[must_use]
    pub fn last_chat_with(&self, counterpart: &str) -> Option<&MemoryNode> {
        let key = (NodeKind::Chat, counterpart.trim().to_lowercase());
        let id = self.keyword_index.get(&key)?.last()?;
        self.nodes.get(id)
    }

    /// Ids of `kind` nodes carrying `keyword`, newest first.
    #[must_use]
    pub fn by_keyword(&self, kind: NodeKind, keyword: &str) -> Vec<NodeId> {
        let key = (kind, keyword.trim().to_lowercase());
        self.keyword_index
            .get(&key)
            .map(|ids| ids.iter().rev().copied().collect())
            .unwrap_or_default()
    }

    /// Nodes of `kinds` sharing any keyword with `triple`, newest first,
    /// without duplicates.
    #[must_use]
    pub fn related(&self, kinds: &[NodeKind], triple: &Triple) -> Vec<&MemoryNode> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for &kind in kinds {
            for keyword in triple.keywords() {
                for id in self.by_keyword(kind, &keyword) {
                    if seen.insert(id) {
                        ids.push(id);
                    }
                }
            }
        }
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.iter().filter_map(|id| self.nodes.get(id)).collect()
    }

    /// Triples of the `retention` most recent events, newest first.
    #[must_use]
    pub fn latest_event_triples(&self, retention: usize) -> Vec<Triple> {
        self.sequences
            .get(&NodeKind::Event)
            .map(|ids| {
                ids.iter()
                    .rev()
                    .take(retention)
                    .filter_map(|id| self.nodes.get(id))
                    .map(|node| node.triple.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// An embedding already computed for the same (normalized) text.
    #[must_use]
    pub fn cached_embedding(&self, text: &str) -> Option<&Embedding> {
        let id = self.embedding_index.get(&normalize_key(text))?;
        self.nodes.get(id).map(|node| &node.embedding)
    }

    // ------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------

    fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        let mut store = Self::new(snapshot.dimensions);
        for node in snapshot.nodes {
            if node.embedding.dimensions() != store.dimensions {
                return Err(ReverieError::InvalidNode(format!(
                    "{} has {} embedding dimensions, store expects {}",
                    node.id,
                    node.embedding.dimensions(),
                    store.dimensions
                )));
            }
            if store.nodes.contains_key(&node.id) || node.id.0 < store.next_id {
                return Err(ReverieError::InvalidNode(format!(
                    "{} is duplicated or out of creation order",
                    node.id
                )));
            }
            for &evidence in &node.evidence {
                check_evidence(node.id, evidence, store.nodes.contains_key(&evidence))?;
            }
            store.next_id = node.id.0 + 1;
            store.index(node);
        }
        store.next_id = store.next_id.max(snapshot.next_id);
        Ok(store)
    }
}

fn check_evidence(node: NodeId, evidence: NodeId, exists: bool) -> Result<()> {
    let reason = if evidence == node {
        "a node cannot cite itself"
    } else if evidence > node {
        "forward reference would close a cycle"
    } else if !exists {
        "unknown node"
    } else {
        return Ok(());
    };
    Err(ReverieError::InvalidEvidence {
        node,
        evidence,
        reason: reason.to_string(),
    })
}

/// Serialized form of a [`MemoryStore`]: the nodes in creation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Embedding dimensionality.
    pub dimensions: usize,
    /// Next id to assign; preserved so ids are never reused after reload.
    pub next_id: u64,
    /// All nodes, in creation order.
    pub nodes: Vec<MemoryNode>,
}

#[derive(Serialize)]
struct StoreSnapshotRef<'a> {
    dimensions: usize,
    next_id: u64,
    nodes: Vec<&'a MemoryNode>,
}

impl Serialize for MemoryStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        StoreSnapshotRef {
            dimensions: self.dimensions,
            next_id: self.next_id,
            nodes: self.nodes.values().collect(),
        }
        .serialize(serializer)
    }
}

impl TryFrom<StoreSnapshot> for MemoryStore {
    type Error = ReverieError;

    fn try_from(snapshot: StoreSnapshot) -> Result<Self> {
        Self::from_snapshot(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
