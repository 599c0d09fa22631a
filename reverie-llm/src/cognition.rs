//! LLM-backed [`CognitionService`].
//!
//! Each operation renders its prompt, sends it on the template's tier,
//! and decodes the reply with [`crate::parse`]. Embeddings come from the
//! remote embedding model or a local provider, behind an LRU cache.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use reverie_core::cognition::{CognitionService, PoignancyKind};
use reverie_core::embedding::{EmbeddingProvider, HashEmbeddingProvider};
use reverie_core::{CognitionError, Embedding, ReverieConfig, Triple};

use crate::client::LlmClient;
use crate::error::LlmError;
use crate::parse;
use crate::prompt::{PromptEngine, PromptId};

/// Who the prompts are written for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    /// Full name, e.g. `"Isabella Rodriguez"`.
    pub name: String,
    /// A short identity paragraph placed in every system prompt.
    pub identity: String,
}

impl Persona {
    /// Create a persona.
    #[must_use]
    pub fn new(name: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: identity.into(),
        }
    }
}

enum EmbeddingSource {
    Remote,
    Local(Box<dyn EmbeddingProvider>),
}

/// Cognition over an [`LlmClient`].
pub struct LlmCognition {
    client: LlmClient,
    prompts: PromptEngine,
    persona: Persona,
    embeddings: EmbeddingSource,
    cache: Mutex<LruCache<String, Embedding>>,
    dimensions: usize,
    timeout_ms: u64,
}

impl LlmCognition {
    /// Remote embeddings, built-in prompts, a 1024-entry cache and a 30s
    /// request timeout.
    #[must_use]
    pub fn new(client: LlmClient, persona: Persona, dimensions: usize) -> Self {
        Self {
            client,
            prompts: PromptEngine::builtin(),
            persona,
            embeddings: EmbeddingSource::Remote,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(1024).unwrap_or(NonZeroUsize::MIN))),
            dimensions,
            timeout_ms: 30_000,
        }
    }

    /// Build from the full configuration.
    ///
    /// # Errors
    ///
    /// [`LlmError::ConfigError`] for an unusable provider or an unknown
    /// `embedding_backend`.
    pub fn from_config(config: &ReverieConfig, persona: Persona) -> Result<Self, LlmError> {
        let dims = config.memory.embedding_dimensions;
        let cognition = Self::new(LlmClient::from_config(&config.llm)?, persona, dims)
            .with_cache_size(config.llm.embedding_cache_size)
            .with_timeout(config.llm.request_timeout_ms);
        match config.llm.embedding_backend.as_str() {
            "remote" => Ok(cognition),
            "local" => Ok(cognition.with_local_embeddings(Box::new(HashEmbeddingProvider::new(dims)))),
            other => Err(LlmError::ConfigError(format!("unknown embedding_backend '{other}'"))),
        }
    }

    /// Replace the prompt templates.
    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptEngine) -> Self {
        self.prompts = prompts;
        self
    }

    /// Embed locally instead of calling the embedding model.
    #[must_use]
    pub fn with_local_embeddings(mut self, provider: Box<dyn EmbeddingProvider>) -> Self {
        self.embeddings = EmbeddingSource::Local(provider);
        self
    }

    /// Resize the embedding cache. Zero keeps a single entry.
    #[must_use]
    pub fn with_cache_size(self, entries: usize) -> Self {
        let cap = NonZeroUsize::new(entries).unwrap_or(NonZeroUsize::MIN);
        self.cache.lock().resize(cap);
        self
    }

    /// Per-request timeout in milliseconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// The persona prompts are written for.
    #[must_use]
    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// Number of cached embeddings.
    #[must_use]
    pub fn cached_embeddings(&self) -> usize {
        self.cache.lock().len()
    }

    async fn ask(&self, id: PromptId, vars: &[(&str, &str)]) -> Result<String, LlmError> {
        let mut all = vec![
            ("persona_name", self.persona.name.as_str()),
            ("persona_identity", self.persona.identity.as_str()),
        ];
        all.extend_from_slice(vars);
        let request = self.prompts.request(id, &all)?.with_timeout(self.timeout_ms);
        let response = self.client.generate(&request).await?;
        debug!(
            prompt = %id,
            model = %response.model,
            tokens = response.tokens_generated,
            latency_ms = response.latency_ms,
            "Cognition request answered"
        );
        Ok(response.text)
    }
}

impl CognitionService for LlmCognition {
    async fn focal_points(&self, statements: &str, n: usize) -> Result<Vec<String>, CognitionError> {
        let count = n.to_string();
        let text = self
            .ask(PromptId::FocalPoints, &[("statements", statements), ("count", &count)])
            .await?;
        Ok(parse::focal_points(&text, n)?)
    }

    async fn insights_and_evidence(
        &self,
        numbered_statements: &str,
        n: usize,
    ) -> Result<serde_json::Value, CognitionError> {
        let count = n.to_string();
        let text = self
            .ask(PromptId::Insights, &[("statements", numbered_statements), ("count", &count)])
            .await?;
        Ok(parse::insights(&text)?)
    }

    async fn event_triple(&self, description: &str) -> Result<Triple, CognitionError> {
        let text = self
            .ask(PromptId::EventTriple, &[("description", description)])
            .await?;
        Ok(parse::triple(&text)?)
    }

    async fn poignancy(&self, kind: PoignancyKind, description: &str) -> Result<u32, CognitionError> {
        let id = match kind {
            PoignancyKind::Event | PoignancyKind::Thought => PromptId::EventPoignancy,
            PoignancyKind::Chat => PromptId::ChatPoignancy,
        };
        let text = self.ask(id, &[("description", description)]).await?;
        Ok(parse::poignancy(&text)?)
    }

    async fn planning_thought(&self, transcript: &str) -> Result<String, CognitionError> {
        let text = self
            .ask(PromptId::PlanningThought, &[("transcript", transcript)])
            .await?;
        Ok(parse::thought(&text)?)
    }

    async fn memo_thought(&self, transcript: &str) -> Result<String, CognitionError> {
        let text = self
            .ask(PromptId::MemoThought, &[("transcript", transcript)])
            .await?;
        Ok(parse::thought(&text)?)
    }

    async fn embedding(&self, text: &str) -> Result<Embedding, CognitionError> {
        let cached = self.cache.lock().get(text).cloned();
        if let Some(embedding) = cached {
            return Ok(embedding);
        }

        let embedding = match &self.embeddings {
            EmbeddingSource::Remote => Embedding(self.client.embed(text, self.timeout_ms).await?),
            EmbeddingSource::Local(provider) => provider
                .embed(text)
                .map_err(|e| CognitionError::Unavailable(e.to_string()))?,
        };
        if embedding.0.len() != self.dimensions {
            return Err(CognitionError::Malformed(format!(
                "embedding has {} dimensions, expected {}",
                embedding.0.len(),
                self.dimensions
            )));
        }

        self.cache.lock().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }
}
