//! Error types for the Reverie core library.

use thiserror::Error;

use crate::types::NodeId;

/// Top-level error type for all Reverie core operations.
#[derive(Error, Debug)]
pub enum ReverieError {
    /// A memory node with the given ID was not found.
    #[error("Memory node not found: {0}")]
    NotFound(NodeId),

    /// Evidence attached to a new node is dangling, self-referential, or
    /// would close a cycle in the provenance graph.
    #[error("Invalid evidence {evidence} for {node}: {reason}")]
    InvalidEvidence {
        /// The id the new node would have received.
        node: NodeId,
        /// The offending evidence id.
        evidence: NodeId,
        /// Why the evidence was rejected.
        reason: String,
    },

    /// A node violated a structural invariant (embedding dimensionality,
    /// expiration ordering, missing evidence on a thought).
    #[error("Invalid memory node: {0}")]
    InvalidNode(String),

    /// Conversation distillation found no chat record with the counterpart.
    #[error("No conversation recorded with {0}")]
    NoConversation(String),

    /// The Cognition Service failed or returned an unusable answer.
    #[error("Cognition service error: {0}")]
    Cognition(#[from] CognitionError),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by a [`CognitionService`](crate::cognition::CognitionService).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CognitionError {
    /// The service could not be reached or has no backend configured.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete within its deadline.
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// The service answered, but the answer does not fit the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ReverieError>;
