//! # reverie-llm: LLM-backed cognition for Reverie
//!
//! Implements [`reverie_core::cognition::CognitionService`] over a language
//! model backend:
//!   - **Ollama** (local, recommended default)
//!   - **OpenAI-compatible API**
//!
//! Every call goes through this crate, which takes care of:
//!   - JSON-mode output and lenient decoding
//!   - Timeout management
//!   - Retries
//!   - Mapping backend failures onto [`reverie_core::CognitionError`]
//!
//! # Architecture
//!
//! ```text
//! Tier 0: Rule-Based (No LLM) - reverie_core::rule_based       [<0.1ms]
//! Tier 1: Small Model - triples, poignancy                     [50–200ms]
//! Tier 2: Large Model - focal points, insights, thoughts       [200ms–2s]
//! ```

pub mod client;
pub mod cognition;
pub mod error;
pub mod parse;
pub mod prompt;
pub mod types;

pub use client::LlmClient;
pub use cognition::{LlmCognition, Persona};
pub use error::LlmError;
pub use types::{LlmRequest, LlmResponse, LlmTier};
