//! Configuration for the Reverie memory system.
//!
//! Maps directly to `reverie.toml`. Every field has a default, so an empty
//! file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Top-level Reverie configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReverieConfig {
    /// Memory store settings.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Retrieval ranking settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Reflection trigger and fan-out settings.
    #[serde(default)]
    pub reflection: ReflectionConfig,
    /// LLM integration settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Persistence / save settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl ReverieConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ReverieError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::ReverieError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Per-character memory store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Embedding vector dimensions every node must have.
    #[serde(default = "default_384")]
    pub embedding_dimensions: usize,
    /// Days until a derived thought expires.
    #[serde(default = "default_30")]
    pub thought_lifetime_days: i64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            embedding_dimensions: 384,
            thought_lifetime_days: 30,
        }
    }
}

/// Retrieval ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Geometric decay applied per rank of staleness, in (0, 1).
    #[serde(default = "default_recency_decay")]
    pub recency_decay: f64,
    /// Number of nodes retrieved per focal query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Score blend weights.
    #[serde(default)]
    pub weights: RetrievalWeights,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            recency_decay: 0.99,
            top_k: 30,
            weights: RetrievalWeights::default(),
        }
    }
}

/// Weights of the three ranking criteria.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalWeights {
    /// Weight for the recency score.
    #[serde(default = "default_1_0")]
    pub recency: f64,
    /// Weight for the normalized importance score.
    #[serde(default = "default_1_0")]
    pub importance: f64,
    /// Weight for the normalized relevance score.
    #[serde(default = "default_1_0")]
    pub relevance: f64,
}

impl RetrievalWeights {
    /// Equal blend of all three criteria.
    pub const EQUAL: Self = Self {
        recency: 1.0,
        importance: 1.0,
        relevance: 1.0,
    };

    /// Rank purely on semantic relevance.
    pub const RELEVANCE_ONLY: Self = Self {
        recency: 0.0,
        importance: 0.0,
        relevance: 1.0,
    };
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self::EQUAL
    }
}

/// Reflection trigger and fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    /// Accumulated importance that must be consumed before a reflection fires.
    #[serde(default = "default_150")]
    pub importance_threshold_max: i32,
    /// Number of focal points requested per reflection.
    #[serde(default = "default_3")]
    pub focal_point_count: usize,
    /// Maximum insights requested per focal point.
    #[serde(default = "default_5")]
    pub insights_per_focal_point: usize,
    /// Deadline for a single insight-generation request, in milliseconds.
    #[serde(default = "default_30000")]
    pub insight_timeout_ms: u64,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            importance_threshold_max: 150,
            focal_point_count: 3,
            insights_per_focal_point: 5,
            insight_timeout_ms: 30_000,
        }
    }
}

/// LLM integration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai", "none".
    #[serde(default = "default_ollama")]
    pub provider: String,
    /// Base URL for the LLM API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// API key for OpenAI-compatible providers.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model for short extraction and scoring prompts.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Model for focal points, insights and conversation thoughts.
    /// Falls back to `chat_model`.
    #[serde(default)]
    pub reflection_model: Option<String>,
    /// Embedding backend: "remote" or "local".
    #[serde(default = "default_remote")]
    pub embedding_backend: String,
    /// Model used for remote embeddings.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Number of embeddings kept in the in-process LRU cache.
    #[serde(default = "default_1024")]
    pub embedding_cache_size: usize,
    /// Hard timeout for any LLM call in milliseconds.
    #[serde(default = "default_30000")]
    pub request_timeout_ms: u64,
    /// Retries after the first failed attempt.
    #[serde(default = "default_2")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            chat_model: "qwen2.5:7b-instruct".to_string(),
            reflection_model: None,
            embedding_backend: "remote".to_string(),
            embedding_model: "all-minilm".to_string(),
            embedding_cache_size: 1024,
            request_timeout_ms: 30_000,
            max_retries: 2,
        }
    }
}

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Number of save backups to keep.
    #[serde(default = "default_3_u32")]
    pub backup_count: u32,
    /// Detect save corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            backup_count: 3,
            checksum_enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_ollama() -> String { "ollama".to_string() }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_chat_model() -> String { "qwen2.5:7b-instruct".to_string() }
fn default_remote() -> String { "remote".to_string() }
fn default_embedding_model() -> String { "all-minilm".to_string() }
fn default_recency_decay() -> f64 { 0.99 }
fn default_1_0() -> f64 { 1.0 }
fn default_2() -> u32 { 2 }
fn default_3() -> usize { 3 }
fn default_3_u32() -> u32 { 3 }
fn default_5() -> usize { 5 }
fn default_30() -> i64 { 30 }
fn default_top_k() -> usize { 30 }
fn default_150() -> i32 { 150 }
fn default_384() -> usize { 384 }
fn default_1024() -> usize { 1024 }
fn default_30000() -> u64 { 30_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = ReverieConfig::from_toml("").expect("parse");
        assert_eq!(config.reflection.importance_threshold_max, 150);
        assert_eq!(config.retrieval.weights, RetrievalWeights::EQUAL);
        assert!((config.retrieval.recency_decay - 0.99).abs() < f64::EPSILON);
        assert_eq!(config.memory.thought_lifetime_days, 30);
    }

    #[test]
    fn partial_sections_override() {
        let config = ReverieConfig::from_toml(
            r#"
            [reflection]
            importance_threshold_max = 90

            [retrieval.weights]
            relevance = 3.0
            "#,
        )
        .expect("parse");
        assert_eq!(config.reflection.importance_threshold_max, 90);
        assert_eq!(config.reflection.focal_point_count, 3);
        assert!((config.retrieval.weights.relevance - 3.0).abs() < f64::EPSILON);
        assert!((config.retrieval.weights.recency - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = ReverieConfig::from_toml("[reflection\n").expect_err("should fail");
        assert!(matches!(err, crate::ReverieError::Config(_)));
    }
}
