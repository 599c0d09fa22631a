//! Core types for LLM requests and responses.

use serde::{Deserialize, Serialize};

/// Which model size a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmTier {
    /// Short extraction and scoring prompts (triples, poignancy).
    SmallLocal,
    /// Synthesis prompts (focal points, insights, conversation thoughts).
    LargeModel,
}

impl LlmTier {
    /// Tier from a template's numeric tier (1 = small, anything else = large).
    #[must_use]
    pub fn from_level(level: u8) -> Self {
        if level <= 1 {
            Self::SmallLocal
        } else {
            Self::LargeModel
        }
    }
}

/// A request to the LLM.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// System prompt (persona, rules, constraints).
    pub system: String,
    /// User prompt (statements, transcript, instructions).
    pub user: String,
    /// Which tier is this request?
    pub tier: LlmTier,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    /// Ask the backend to constrain output to JSON.
    pub json_mode: bool,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl LlmRequest {
    /// Create a new Tier 1 request.
    #[must_use]
    pub fn tier1(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            tier: LlmTier::SmallLocal,
            max_tokens: 100,
            temperature: 0.2,
            json_mode: true,
            timeout_ms: 5000,
        }
    }

    /// Create a new Tier 2 request.
    #[must_use]
    pub fn tier2(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            tier: LlmTier::LargeModel,
            max_tokens: 400,
            temperature: 0.7,
            json_mode: true,
            timeout_ms: 30_000,
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// A response from the LLM.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,
    /// How many tokens were generated.
    pub tokens_generated: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Which model was used.
    pub model: String,
}

/// `{"focal_points": [...]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocalPointsResponse {
    /// Questions or topics worth reflecting on.
    pub focal_points: Vec<String>,
}

/// `{"subject": ..., "predicate": ..., "object": ...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripleResponse {
    /// Who or what the description is about.
    pub subject: String,
    /// The relation or action.
    pub predicate: String,
    /// What it applies to.
    pub object: String,
}

/// `{"poignancy": n}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoignancyResponse {
    /// Rating on a 1–10 scale.
    pub poignancy: i64,
}

/// `{"thought": "..."}`, shared by the planning and memo prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtResponse {
    /// The generated thought, without the character's name.
    pub thought: String,
}
