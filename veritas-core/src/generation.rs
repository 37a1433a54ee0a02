//! Text-generation gateway.
//!
//! Wraps an external natural-language generation service behind the
//! [`TextGenerator`] trait: prompt in, raw text out. The service is
//! unreliable by contract — callers treat every failure (and every
//! malformed structured response) as recoverable at the call site.
//!
//! Works against any OpenAI-compatible chat-completions endpoint
//! (OpenAI, Azure, Ollama, vLLM, LM Studio).

use crate::config::{GenerationConfig, RetryConfig};
use crate::error::{GenerationError, SetupError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;

/// A stateless, reentrant text-generation collaborator. Implementations
/// may be shared read-only across pool tasks.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for a prompt. The returned text may or may not parse
    /// as the structured payload the caller asked for.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// The model name, for logging.
    fn model_name(&self) -> &str;
}

/// Execute an async operation with exponential backoff retry on transient
/// errors. Permanent errors (auth, empty completion) return immediately.
pub async fn with_retry<F, Fut>(config: &RetryConfig, operation: F) -> Result<String, GenerationError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<String, GenerationError>>,
{
    let mut last_err = None;
    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(text) => return Ok(text),
            Err(e) => {
                if !is_retryable(&e) || attempt == config.max_retries {
                    return Err(e);
                }
                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms,
                    error = %e,
                    "Retrying generation after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or(GenerationError::Connection {
        message: "All retry attempts exhausted".to_string(),
    }))
}

/// Check if an error is transient.
fn is_retryable(err: &GenerationError) -> bool {
    matches!(
        err,
        GenerationError::RateLimited { .. }
            | GenerationError::Connection { .. }
            | GenerationError::Timeout { .. }
    )
}

/// Compute backoff delay, respecting rate-limit retry-after values.
fn compute_backoff(config: &RetryConfig, attempt: u32, err: &GenerationError) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let computed = (base as u64).min(config.max_backoff_ms);
    if let GenerationError::RateLimited { retry_after_secs } = err {
        return (retry_after_secs * 1000).max(computed);
    }
    computed
}

/// Generator backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiCompatibleGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    timeout_secs: u64,
    retry: RetryConfig,
}

impl OpenAiCompatibleGenerator {
    /// Create a generator from configuration.
    ///
    /// Reads the API key from `config.api_key_env`; a missing key is a
    /// fatal `SetupError`, surfaced before any stage runs.
    pub fn new(config: &GenerationConfig) -> Result<Self, SetupError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| SetupError::EnvVarMissing {
            var: config.api_key_env.clone(),
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Veritas/0.3")
            .build()
            .map_err(|e| SetupError::Invalid {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            retry: config.retry.clone(),
        })
    }

    async fn complete_once(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(30);
            return Err(GenerationError::RateLimited { retry_after_secs });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(GenerationError::AuthFailed {
                provider: self.base_url.clone(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::ApiRequest {
                message: format!("HTTP {status}: {text}"),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::ApiRequest {
                message: format!("Failed to decode completion body: {e}"),
            })?;

        let content = payload
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(GenerationError::EmptyCompletion {
                model: self.model.clone(),
            });
        }
        Ok(content.to_string())
    }

    fn map_transport_error(&self, err: reqwest::Error) -> GenerationError {
        if err.is_timeout() {
            GenerationError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else if err.is_connect() {
            GenerationError::Connection {
                message: err.to_string(),
            }
        } else {
            GenerationError::ApiRequest {
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        with_retry(&self.retry, || self.complete_once(prompt)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// A deterministic generator for tests and offline runs.
///
/// Returns queued responses in order, then the fixed fallback text; or
/// fails every call when built with [`MockGenerator::failing`].
pub struct MockGenerator {
    queued: std::sync::Mutex<Vec<String>>,
    fallback: String,
    fail: bool,
}

impl MockGenerator {
    /// Generator that answers every call with the same text.
    pub fn with_response(text: impl Into<String>) -> Self {
        Self {
            queued: std::sync::Mutex::new(Vec::new()),
            fallback: text.into(),
            fail: false,
        }
    }

    /// Generator whose every call fails with a `GenerationError`.
    pub fn failing() -> Self {
        Self {
            queued: std::sync::Mutex::new(Vec::new()),
            fallback: String::new(),
            fail: true,
        }
    }

    /// Queue a response consumed before the fallback text.
    pub fn queue_response(&self, text: impl Into<String>) {
        self.queued.lock().unwrap().push(text.into());
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::with_response("mock response")
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        if self.fail {
            return Err(GenerationError::ApiRequest {
                message: "mock generator configured to fail".to_string(),
            });
        }
        let mut queued = self.queued.lock().unwrap();
        if queued.is_empty() {
            Ok(self.fallback.clone())
        } else {
            Ok(queued.remove(0))
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}
