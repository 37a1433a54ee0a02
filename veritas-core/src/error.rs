//! Error types for the Veritas research pipeline.
//!
//! Uses `thiserror` for public API error types. The taxonomy mirrors the
//! propagation policy of the pipeline: generation, parse, and provider
//! failures are recoverable at the smallest scope that observes them;
//! setup failures are the only fatal class and surface to the run caller.

use std::path::PathBuf;

/// Top-level error type for the Veritas core library.
#[derive(Debug, thiserror::Error)]
pub enum VeritasError {
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the text-generation gateway.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Empty completion returned by model {model}")]
    EmptyCompletion { model: String },
}

/// Errors from decoding a structured payload out of generated text.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Payload is not valid JSON: {message}")]
    InvalidJson { message: String },

    #[error("Payload has unexpected shape: {message}")]
    UnexpectedShape { message: String },
}

/// Errors from external search/data-source collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Search request to {provider} failed: {message}")]
    RequestFailed { provider: String, message: String },

    #[error("Malformed response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },
}

/// Fatal configuration problems detected before any stage runs.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `VeritasError`.
pub type Result<T> = std::result::Result<T, VeritasError>;
