//! LLM Client: unified interface for Ollama and OpenAI-compatible backends.

use std::time::{Duration, Instant};

use reqwest::Client;
use reverie_core::config::LlmConfig;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{LlmRequest, LlmResponse, LlmTier};

/// Provider backend for LLM inference.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally (recommended).
    Ollama {
        /// e.g. `http://localhost:11434`
        base_url: String,
    },
    /// OpenAI-compatible API.
    OpenAiCompatible {
        /// e.g. `https://api.openai.com`
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No LLM available; all calls fail with [`LlmError::Unavailable`].
    None,
}

/// The main LLM client that routes requests to the appropriate backend.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    tier1_model: String,
    tier2_model: String,
    embedding_model: String,
    max_retries: u32,
}

impl LlmClient {
    /// Create a new LLM client.
    #[must_use]
    pub fn new(
        provider: LlmProvider,
        tier1_model: impl Into<String>,
        tier2_model: impl Into<String>,
        embedding_model: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            provider,
            http: Client::new(),
            tier1_model: tier1_model.into(),
            tier2_model: tier2_model.into(),
            embedding_model: embedding_model.into(),
            max_retries,
        }
    }

    /// Create a client from the `[llm]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] for an unknown provider, or an
    /// OpenAI-compatible provider without an API key.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let provider = match config.provider.as_str() {
            "ollama" => LlmProvider::Ollama {
                base_url: config.base_url.trim_end_matches('/').to_string(),
            },
            "openai" => LlmProvider::OpenAiCompatible {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                api_key: config.api_key.clone().ok_or_else(|| {
                    LlmError::ConfigError("provider 'openai' requires api_key".into())
                })?,
            },
            "none" => LlmProvider::None,
            other => {
                return Err(LlmError::ConfigError(format!("unknown provider '{other}'")));
            }
        };
        let tier2 = config
            .reflection_model
            .clone()
            .unwrap_or_else(|| config.chat_model.clone());
        Ok(Self::new(
            provider,
            config.chat_model.clone(),
            tier2,
            config.embedding_model.clone(),
            config.max_retries,
        ))
    }

    /// Create a client with no LLM backend.
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, "", "", "", 0)
    }

    fn model_for(&self, tier: LlmTier) -> &str {
        match tier {
            LlmTier::SmallLocal => &self.tier1_model,
            LlmTier::LargeModel => &self.tier2_model,
        }
    }

    /// Generate a response from the LLM.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the LLM is unavailable or all retries fail.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = self.model_for(request.tier).to_string();
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => {
                let mut body = json!({
                    "model": model,
                    "prompt": format!("{}\n\n{}", request.system, request.user),
                    "stream": false,
                    "options": {
                        "temperature": request.temperature,
                        "num_predict": request.max_tokens,
                    }
                });
                if request.json_mode {
                    body["format"] = json!("json");
                }
                let url = format!("{base_url}/api/generate");
                let (json, latency_ms) = self.post(&url, None, &body, request.timeout_ms).await?;
                Ok(LlmResponse {
                    text: json["response"].as_str().unwrap_or_default().to_string(),
                    tokens_generated: count(&json["eval_count"]),
                    latency_ms,
                    model,
                })
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let mut body = json!({
                    "model": model,
                    "messages": [
                        { "role": "system", "content": request.system },
                        { "role": "user", "content": request.user },
                    ],
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                });
                if request.json_mode {
                    body["response_format"] = json!({ "type": "json_object" });
                }
                let url = format!("{base_url}/v1/chat/completions");
                let (json, latency_ms) = self
                    .post(&url, Some(api_key), &body, request.timeout_ms)
                    .await?;
                Ok(LlmResponse {
                    text: json["choices"][0]["message"]["content"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    tokens_generated: count(&json["usage"]["completion_tokens"]),
                    latency_ms,
                    model,
                })
            }
        }
    }

    /// Embed `text` with the configured embedding model.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the LLM is unavailable, all retries fail, or the
    /// response carries no embedding.
    pub async fn embed(&self, text: &str, timeout_ms: u64) -> Result<Vec<f32>, LlmError> {
        let (json, pointer) = match &self.provider {
            LlmProvider::None => {
                return Err(LlmError::Unavailable("No LLM provider configured".into()));
            }
            LlmProvider::Ollama { base_url } => {
                let body = json!({ "model": self.embedding_model, "prompt": text });
                let url = format!("{base_url}/api/embeddings");
                (self.post(&url, None, &body, timeout_ms).await?.0, "/embedding")
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let body = json!({ "model": self.embedding_model, "input": text });
                let url = format!("{base_url}/v1/embeddings");
                (
                    self.post(&url, Some(api_key), &body, timeout_ms).await?.0,
                    "/data/0/embedding",
                )
            }
        };

        let values = json
            .pointer(pointer)
            .and_then(Value::as_array)
            .ok_or_else(|| LlmError::SchemaValidation(format!("no embedding at {pointer}")))?;
        #[allow(clippy::cast_possible_truncation)]
        let embedding = values
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| LlmError::SchemaValidation("non-numeric embedding value".into()))
            })
            .collect();
        embedding
    }

    /// POST `body` with retries; returns the decoded JSON body and latency.
    async fn post(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &Value,
        timeout_ms: u64,
    ) -> Result<(Value, u64), LlmError> {
        let mut last_error = String::new();
        let mut timed_out = true;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt = attempt + 1, max = self.max_retries + 1, url, "Retrying LLM call");
            }

            let start = Instant::now();
            let mut req = self
                .http
                .post(url)
                .json(body)
                .timeout(Duration::from_millis(timeout_ms));
            if let Some(key) = bearer {
                req = req.bearer_auth(key);
            }
            let result = req.send().await;
            let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let json: Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    return Ok((json, latency_ms));
                }
                Ok(resp) => {
                    timed_out = false;
                    last_error = format!(
                        "HTTP {}: {}",
                        resp.status(),
                        resp.text().await.unwrap_or_default()
                    );
                    warn!(url, error = %last_error, "LLM backend returned error");
                }
                Err(e) => {
                    timed_out &= e.is_timeout();
                    last_error = e.to_string();
                    if e.is_timeout() {
                        warn!(url, timeout_ms, "LLM request timed out");
                    } else {
                        warn!(url, error = %last_error, "LLM request failed");
                    }
                }
            }
        }

        if timed_out {
            return Err(LlmError::Timeout(timeout_ms));
        }
        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    /// Parse a raw LLM response text as structured JSON.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the text is not valid JSON or doesn't match the expected type.
    pub fn parse_structured<T: serde::de::DeserializeOwned>(
        &self,
        response: &LlmResponse,
    ) -> Result<T, LlmError> {
        serde_json::from_str(&response.text).map_err(|e| {
            LlmError::ParseError(format!("JSON parse error: {e}, raw text: '{}'", response.text))
        })
    }

    /// Check if the LLM client has a backend configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }
}

fn count(value: &Value) -> u32 {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}
