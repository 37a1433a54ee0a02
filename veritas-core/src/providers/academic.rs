//! Academic search via the arXiv Atom API.
//!
//! The Atom response is parsed with plain tag extraction — the subset of
//! fields we need does not justify an XML dependency.

use super::{RawResult, SearchProvider};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const API_URL: &str = "https://export.arxiv.org/api/query";

pub struct ArxivSearchProvider {
    client: Client,
}

impl ArxivSearchProvider {
    pub fn new(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("Veritas/0.3 (research pipeline)")
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl SearchProvider for ArxivSearchProvider {
    fn name(&self) -> &str {
        "arxiv"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<RawResult>, ProviderError> {
        let url = format!(
            "{API_URL}?search_query=all:{}&start=0&max_results={}&sortBy=relevance",
            urlencoding::encode(query),
            max_results
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            ProviderError::RequestFailed {
                provider: "arxiv".into(),
                message: e.to_string(),
            }
        })?;

        let xml = response
            .text()
            .await
            .map_err(|e| ProviderError::MalformedResponse {
                provider: "arxiv".into(),
                message: e.to_string(),
            })?;

        Ok(parse_atom_entries(&xml, max_results))
    }
}

/// Parse `<entry>` blocks from an arXiv Atom feed into raw results.
fn parse_atom_entries(xml: &str, max_results: usize) -> Vec<RawResult> {
    let mut results = Vec::new();
    for entry in extract_entries(xml).into_iter().take(max_results) {
        let Some(title) = tag_content(&entry, "title") else {
            continue;
        };
        let summary = tag_content(&entry, "summary").unwrap_or_default();
        let url = tag_content(&entry, "id").unwrap_or_default();
        let year = tag_content(&entry, "published")
            .and_then(|p| p.get(..4).map(str::to_string))
            .unwrap_or_default();
        let authors = extract_authors(&entry);

        results.push(RawResult {
            title: collapse_whitespace(&title),
            url,
            content: collapse_whitespace(&summary),
            metadata: json!({
                "authors": authors.join(", "),
                "year": year,
                "journal": "arXiv",
            }),
        });
    }
    results
}

/// Extract all `<entry>...</entry>` blocks.
fn extract_entries(xml: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut search_from = 0;
    while let Some(pos) = xml[search_from..].find("<entry>") {
        let start = search_from + pos + "<entry>".len();
        let Some(end_pos) = xml[start..].find("</entry>") else {
            break;
        };
        entries.push(xml[start..start + end_pos].to_string());
        search_from = start + end_pos + "</entry>".len();
    }
    entries
}

/// Content of the first `<tag>...</tag>` occurrence.
fn tag_content(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].trim().to_string())
}

fn extract_authors(entry: &str) -> Vec<String> {
    let mut authors = Vec::new();
    let mut search_from = 0;
    while let Some(pos) = entry[search_from..].find("<author>") {
        let start = search_from + pos + "<author>".len();
        let Some(end_pos) = entry[start..].find("</author>") else {
            break;
        };
        let block = &entry[start..start + end_pos];
        if let Some(name) = tag_content(block, "name") {
            authors.push(name);
        }
        search_from = start + end_pos + "</author>".len();
    }
    authors
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
