//! LLM error types.

use reverie_core::CognitionError;
use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed.
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    /// LLM response was not valid JSON.
    #[error("Failed to parse LLM response as JSON: {0}")]
    ParseError(String),

    /// LLM response did not match expected schema.
    #[error("LLM output schema validation failed: {0}")]
    SchemaValidation(String),

    /// Request timed out.
    #[error("LLM request timed out after {0}ms")]
    Timeout(u64),

    /// LLM provider is unavailable.
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),

    /// All retry attempts exhausted.
    #[error("All LLM retry attempts exhausted after {attempts} tries: {last_error}")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// The error from the final attempt.
        last_error: String,
    },

    /// Configuration error.
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(0)
        } else if err.is_connect() {
            LlmError::Unavailable(err.to_string())
        } else {
            LlmError::RequestFailed(err.to_string())
        }
    }
}

/// The core only distinguishes "could not ask", "took too long" and
/// "answer unusable".
impl From<LlmError> for CognitionError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(ms) => CognitionError::Timeout(ms),
            LlmError::ParseError(msg) | LlmError::SchemaValidation(msg) => {
                CognitionError::Malformed(msg)
            }
            other @ (LlmError::RequestFailed(_)
            | LlmError::Unavailable(_)
            | LlmError::RetriesExhausted { .. }
            | LlmError::ConfigError(_)) => CognitionError::Unavailable(other.to_string()),
        }
    }
}
