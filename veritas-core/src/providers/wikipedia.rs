//! Wikipedia search via the public MediaWiki API.
//!
//! Two requests per search: a title query, then an extract fetch for the
//! matched pages. Both are bounded by the configured timeout.

use super::{RawResult, SearchProvider};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

const API_URL: &str = "https://en.wikipedia.org/w/api.php";

pub struct WikipediaSearchProvider {
    client: Client,
}

impl WikipediaSearchProvider {
    pub fn new(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("Veritas/0.3 (research pipeline)")
            .build()
            .unwrap_or_default();
        Self { client }
    }

    async fn get_json(&self, url: &str) -> Result<Value, ProviderError> {
        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|e| ProviderError::RequestFailed {
                    provider: "wikipedia".into(),
                    message: e.to_string(),
                })?;
        response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse {
                provider: "wikipedia".into(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl SearchProvider for WikipediaSearchProvider {
    fn name(&self) -> &str {
        "wikipedia"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<RawResult>, ProviderError> {
        let search_url = format!(
            "{API_URL}?action=query&list=search&srsearch={}&srlimit={}&format=json",
            urlencoding::encode(query),
            max_results
        );
        let body = self.get_json(&search_url).await?;

        let hits = body
            .pointer("/query/search")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::new();
        for hit in hits.iter().take(max_results) {
            let Some(title) = hit.get("title").and_then(|v| v.as_str()) else {
                continue;
            };

            // Fetch the intro extract for the page
            let extract_url = format!(
                "{API_URL}?action=query&prop=extracts&exintro=1&explaintext=1&titles={}&format=json",
                urlencoding::encode(title)
            );
            let extract = match self.get_json(&extract_url).await {
                Ok(page_body) => page_body
                    .pointer("/query/pages")
                    .and_then(|pages| pages.as_object())
                    .and_then(|pages| pages.values().next())
                    .and_then(|page| page.get("extract"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                Err(e) => {
                    tracing::warn!(title, error = %e, "Failed to fetch Wikipedia extract");
                    String::new()
                }
            };

            let content = if extract.is_empty() {
                // Fall back to the search snippet (HTML-stripped poorly, but
                // extraction cleans it up downstream)
                hit.get("snippet")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            } else {
                extract
            };

            results.push(RawResult {
                title: title.to_string(),
                url: format!(
                    "https://en.wikipedia.org/wiki/{}",
                    urlencoding::encode(&title.replace(' ', "_"))
                ),
                content,
                metadata: json!({
                    "wordcount": hit.get("wordcount").and_then(|v| v.as_u64()).unwrap_or(0),
                }),
            });
        }

        Ok(results)
    }
}
