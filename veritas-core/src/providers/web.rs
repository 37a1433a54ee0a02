//! Web search via the DuckDuckGo instant-answer API.
//!
//! No API key required. The instant-answer endpoint returns an abstract
//! plus related topics; both are mapped to [`RawResult`]s.

use super::{RawResult, SearchProvider};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

pub struct DuckDuckGoSearchProvider {
    client: Client,
}

impl DuckDuckGoSearchProvider {
    pub fn new(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("Veritas/0.3")
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearchProvider {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<RawResult>, ProviderError> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_html=1&skip_disambig=1",
            urlencoding::encode(query)
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            ProviderError::RequestFailed {
                provider: "duckduckgo".into(),
                message: e.to_string(),
            }
        })?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse {
                provider: "duckduckgo".into(),
                message: e.to_string(),
            })?;

        let mut results = Vec::new();

        // Main abstract, when DuckDuckGo has one
        if let Some(abstract_text) = body.get("AbstractText").and_then(|v| v.as_str()) {
            if !abstract_text.is_empty() {
                results.push(RawResult {
                    title: body
                        .get("Heading")
                        .and_then(|v| v.as_str())
                        .unwrap_or(query)
                        .to_string(),
                    url: body
                        .get("AbstractURL")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    content: abstract_text.to_string(),
                    metadata: json!({
                        "site": body.get("AbstractSource").and_then(|v| v.as_str()).unwrap_or(""),
                    }),
                });
            }
        }

        // Related topics fill out the remainder
        if let Some(related) = body.get("RelatedTopics").and_then(|v| v.as_array()) {
            for item in related {
                if results.len() >= max_results {
                    break;
                }
                let (Some(text), Some(first_url)) = (
                    item.get("Text").and_then(|v| v.as_str()),
                    item.get("FirstURL").and_then(|v| v.as_str()),
                ) else {
                    continue;
                };
                results.push(RawResult {
                    title: text.chars().take(80).collect(),
                    url: first_url.to_string(),
                    content: text.to_string(),
                    metadata: Value::Null,
                });
            }
        }

        results.truncate(max_results);
        Ok(results)
    }
}
