//! Core type definitions for the Reverie memory system.
//!
//! All types are serializable so a character's full state can be dumped and
//! reloaded without loss.

use std::fmt;

use chrono::NaiveDateTime;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for a memory node.
///
/// Assigned monotonically by the [`MemoryStore`](crate::memory::MemoryStore)
/// and never reused, so `a < b` means `a` was created before `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// The three kinds of memory node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Something the character perceived happening.
    Event,
    /// A derived, higher-level statement (reflection insight or conversation note).
    Thought,
    /// A record of a conversation.
    Chat,
}

impl NodeKind {
    /// All node kinds, in storage order.
    pub const ALL: [Self; 3] = [Self::Event, Self::Thought, Self::Chat];
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Event => "event",
            Self::Thought => "thought",
            Self::Chat => "chat",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Simulation clock time. The world clock has no timezone.
pub type SimTime = NaiveDateTime;

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// A `(subject, predicate, object)` summary of a memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    /// Who or what the memory is about (e.g. `"Isabella Rodriguez"`).
    pub subject: String,
    /// The relation (e.g. `"is"`).
    pub predicate: String,
    /// The object of the relation (e.g. `"idle"`).
    pub object: String,
}

impl Triple {
    /// Build a triple from its three parts.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// The three parts as lower-cased keywords.
    #[must_use]
    pub fn keywords(&self) -> Vec<String> {
        [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .map(|part| part.trim().to_lowercase())
            .filter(|part| !part.is_empty())
            .collect()
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.predicate, self.object)
    }
}

/// One line of a conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    /// Who spoke.
    pub speaker: String,
    /// What they said.
    pub text: String,
}

impl Utterance {
    /// Build an utterance.
    #[must_use]
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }
}

/// Render a transcript as one `speaker: text` line per utterance.
#[must_use]
pub fn format_transcript(transcript: &[Utterance]) -> String {
    let mut out = String::new();
    for row in transcript {
        out.push_str(&row.speaker);
        out.push_str(": ");
        out.push_str(&row.text);
        out.push('\n');
    }
    out
}

/// Normalize a description into the key used for embedding deduplication:
/// trimmed, lower-cased, with runs of whitespace collapsed.
#[must_use]
pub fn normalize_key(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Idle placeholders carry `idle` in their embedding key and are excluded
/// from reflection and ranking.
#[must_use]
pub fn is_idle_key(embedding_key: &str) -> bool {
    embedding_key.contains("idle")
}

// ---------------------------------------------------------------------------
// Memory Embedding Vector
// ---------------------------------------------------------------------------

/// A dense vector embedding for semantic similarity search.
/// Typically 384 dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Cosine similarity with another embedding. See
    /// [`cosine_similarity`](crate::embedding::cosine_similarity).
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        crate::embedding::cosine_similarity(self, other)
    }

    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }
}

// ---------------------------------------------------------------------------
// Retrieval Score
// ---------------------------------------------------------------------------

/// Totally ordered score used to rank memory nodes during retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RetrievalScore(pub OrderedFloat<f64>);

impl RetrievalScore {
    /// Create a retrieval score from a raw f64.
    #[must_use]
    pub fn new(score: f64) -> Self {
        Self(OrderedFloat(score))
    }

    /// Get the raw score value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_displays_with_prefix() {
        assert_eq!(NodeId(7).to_string(), "node_7");
    }

    #[test]
    fn triple_keywords_are_lowercased() {
        let triple = Triple::new("Isabella Rodriguez", "is", "Idle");
        assert_eq!(triple.keywords(), vec!["isabella rodriguez", "is", "idle"]);
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_key("  Klaus   is\tREADING "), "klaus is reading");
    }

    #[test]
    fn transcript_formatting() {
        let transcript = vec![Utterance::new("A", "hi"), Utterance::new("B", "hello")];
        assert_eq!(format_transcript(&transcript), "A: hi\nB: hello\n");
    }
}
