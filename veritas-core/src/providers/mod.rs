//! External search collaborators.
//!
//! Each lane of the collector talks to one of these adapters through the
//! [`SearchProvider`] trait. Adapters are fail-soft by contract: they may
//! return fewer (or zero) results, and any transport failure is reported
//! as a `ProviderError` that the collector catches at the lane level.

pub mod academic;
pub mod web;
pub mod wikipedia;

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use academic::ArxivSearchProvider;
pub use web::DuckDuckGoSearchProvider;
pub use wikipedia::WikipediaSearchProvider;

/// A raw, un-extracted search hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A stateless, reentrant search collaborator shared read-only across
/// lane tasks.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Search for `query`, returning at most `max_results` hits in
    /// provider order.
    async fn search(&self, query: &str, max_results: usize)
    -> Result<Vec<RawResult>, ProviderError>;
}

/// The bundle of providers the collector fans out to. The news lane
/// reuses the web provider with a news-suffixed query.
#[derive(Clone)]
pub struct SearchProviders {
    pub web: Arc<dyn SearchProvider>,
    pub wikipedia: Arc<dyn SearchProvider>,
    pub academic: Arc<dyn SearchProvider>,
}

impl SearchProviders {
    /// Live adapters against the public DuckDuckGo, MediaWiki, and arXiv
    /// endpoints.
    pub fn live(timeout_secs: u64) -> Self {
        Self {
            web: Arc::new(DuckDuckGoSearchProvider::new(timeout_secs)),
            wikipedia: Arc::new(WikipediaSearchProvider::new(timeout_secs)),
            academic: Arc::new(ArxivSearchProvider::new(timeout_secs)),
        }
    }

    /// One provider serving all lanes; used by tests and offline runs.
    pub fn uniform(provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            web: provider.clone(),
            wikipedia: provider.clone(),
            academic: provider,
        }
    }
}

/// Provider that serves canned results, for tests and offline runs.
///
/// Returns up to `max_results` copies of the canned set, titles suffixed
/// with the query so repeated runs stay deterministic and distinguishable.
pub struct StaticSearchProvider {
    name: String,
    results: Vec<RawResult>,
}

impl StaticSearchProvider {
    pub fn new(name: impl Into<String>, results: Vec<RawResult>) -> Self {
        Self {
            name: name.into(),
            results,
        }
    }

    /// A provider with `count` generic hits.
    pub fn with_count(name: impl Into<String>, count: usize) -> Self {
        let name = name.into();
        let results = (0..count)
            .map(|i| RawResult {
                title: format!("{name} result {}", i + 1),
                url: format!("https://example.com/{name}/{}", i + 1),
                content: format!("Canned content {} from {name}.", i + 1),
                metadata: serde_json::Value::Null,
            })
            .collect();
        Self { name, results }
    }
}

#[async_trait]
impl SearchProvider for StaticSearchProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        _query: &str,
        max_results: usize,
    ) -> Result<Vec<RawResult>, ProviderError> {
        Ok(self.results.iter().take(max_results).cloned().collect())
    }
}

/// Provider that always fails; used to exercise lane isolation in tests.
pub struct FailingSearchProvider;

#[async_trait]
impl SearchProvider for FailingSearchProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn search(
        &self,
        _query: &str,
        _max_results: usize,
    ) -> Result<Vec<RawResult>, ProviderError> {
        Err(ProviderError::RequestFailed {
            provider: "failing".to_string(),
            message: "provider configured to fail".to_string(),
        })
    }
}
