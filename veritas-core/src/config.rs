//! Configuration for the Veritas pipeline.
//!
//! Uses `figment` for layered configuration: defaults -> user config file
//! -> workspace `veritas.toml` -> `VERITAS_*` environment variables.
//! The loaded value is passed explicitly into the engine and every
//! adapter constructor; no module reads configuration ambiently.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SetupError;

/// Top-level configuration for a Veritas process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VeritasConfig {
    pub generation: GenerationConfig,
    pub research: ResearchConfig,
}

/// Text-generation gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Provider label, informational only (any OpenAI-compatible endpoint).
    pub provider: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Override for the chat-completions base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Per-request timeout. Every generation call is bounded by this so a
    /// hung call cannot stall a pool task.
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "VERITAS_API_KEY".to_string(),
            base_url: None,
            max_tokens: 4096,
            temperature: 0.3,
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry policy for transient generation failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 15_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Research pipeline knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Source budget per expanded topic, split across lanes.
    pub max_sources: usize,
    /// Items below this reliability score never reach synthesis.
    pub verification_threshold: f64,
    /// "APA" or "MLA".
    pub citation_style: String,
    /// Approximate word budget for the generated report.
    pub max_report_words: usize,
    /// Width of the bounded worker pool used for collection lanes and
    /// phase-A verification.
    pub worker_width: usize,
    /// Per-request timeout for search providers.
    pub search_timeout_secs: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_sources: 20,
            verification_threshold: 0.7,
            citation_style: "APA".to_string(),
            max_report_words: 4000,
            worker_width: 4,
            search_timeout_secs: 15,
        }
    }
}

impl VeritasConfig {
    /// Validate values a default-construction can't guarantee. Fatal
    /// problems are reported as `SetupError` before any stage runs.
    pub fn validate(&self) -> Result<(), SetupError> {
        if !(0.0..=1.0).contains(&self.research.verification_threshold) {
            return Err(SetupError::Invalid {
                message: format!(
                    "verification_threshold must be in [0, 1], got {}",
                    self.research.verification_threshold
                ),
            });
        }
        if self.research.worker_width == 0 {
            return Err(SetupError::Invalid {
                message: "worker_width must be at least 1".to_string(),
            });
        }
        if self.research.max_sources == 0 {
            return Err(SetupError::Invalid {
                message: "max_sources must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Load configuration with figment layering.
///
/// Order: built-in defaults, then `~/.config/veritas/config.toml`, then
/// `<workspace>/veritas.toml`, then `VERITAS_*` env vars
/// (`VERITAS_RESEARCH__MAX_SOURCES`, `VERITAS_GENERATION__MODEL`, ...).
pub fn load_config(workspace: Option<&Path>) -> Result<VeritasConfig, SetupError> {
    let mut figment = Figment::from(Serialized::defaults(VeritasConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "veritas", "veritas") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join("veritas.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed("VERITAS_").split("__"));

    let config: VeritasConfig = figment.extract().map_err(|e| SetupError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VeritasConfig::default();
        assert_eq!(config.research.max_sources, 20);
        assert_eq!(config.research.verification_threshold, 0.7);
        assert_eq!(config.research.worker_width, 4);
        assert_eq!(config.research.citation_style, "APA");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_workspace_toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("veritas.toml"),
            "[research]\nmax_sources = 8\nverification_threshold = 0.5\n",
        )
        .unwrap();

        let config = load_config(Some(dir.path())).unwrap();
        assert_eq!(config.research.max_sources, 8);
        assert_eq!(config.research.verification_threshold, 0.5);
        // Untouched sections keep defaults
        assert_eq!(config.generation.model, "gpt-4o-mini");
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut config = VeritasConfig::default();
        config.research.verification_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(SetupError::Invalid { .. })
        ));
    }

    #[test]
    fn test_zero_worker_width_rejected() {
        let mut config = VeritasConfig::default();
        config.research.worker_width = 0;
        assert!(config.validate().is_err());
    }
}
