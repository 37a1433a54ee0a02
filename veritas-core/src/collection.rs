//! Source collection: fan out to search lanes, extract relevant content.
//!
//! Each expanded topic gets a per-lane source budget derived from the
//! allocation table, gated by the academic/news flags. Active lanes run
//! concurrently on a bounded pool; a failure in one lane yields an empty
//! result set for that lane only and never aborts its siblings.

use crate::generation::TextGenerator;
use crate::payload::truncate_chars;
use crate::providers::{SearchProvider, SearchProviders};
use crate::types::{ExpandedTopic, SourceItem, SourceType};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Prompt input budget for extraction; respects generation token limits.
const EXTRACTION_INPUT_CHARS: usize = 4000;
/// How much raw content is retained alongside the extraction.
const RAW_RETENTION_CHARS: usize = 8000;
/// Raw retention when extraction fails.
const RAW_RETENTION_ON_ERROR_CHARS: usize = 1000;

const CONTENT_EXTRACTION_TEMPLATE: &str = "\
You are a research assistant extracting key information from search results.

Search Query: {search_query}
Raw Content:
{raw_content}

Please extract the most relevant information related to the search query.
Focus on factual information, key insights, and important details.
Ignore advertisements, irrelevant sections, and navigation elements.

Your response should be in the following format:
1. A brief summary (2-3 sentences) of the content
2. 3-5 key points or facts extracted from the content
3. Any important dates, statistics, or quotes (with attribution)

Use clear, concise language and focus on accuracy.";

/// Per-lane source budget for one collection call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneAllocation {
    pub web: usize,
    pub wikipedia: usize,
    pub academic: usize,
    pub news: usize,
}

/// Split `max_sources` across lanes using the fixed ratio table. Ratios
/// are truncated per lane, so the four lanes may sum to slightly less
/// than `max_sources`.
pub fn lane_allocation(
    max_sources: usize,
    include_academic: bool,
    include_news: bool,
) -> LaneAllocation {
    let part = |ratio: f64| (max_sources as f64 * ratio) as usize;
    match (include_academic, include_news) {
        (true, true) => LaneAllocation {
            web: part(0.4),
            wikipedia: part(0.1),
            academic: part(0.4),
            news: part(0.1),
        },
        (true, false) => LaneAllocation {
            web: part(0.5),
            wikipedia: part(0.1),
            academic: part(0.4),
            news: 0,
        },
        (false, true) => LaneAllocation {
            web: part(0.7),
            wikipedia: part(0.1),
            academic: 0,
            news: part(0.2),
        },
        (false, false) => LaneAllocation {
            web: part(0.8),
            wikipedia: part(0.2),
            academic: 0,
            news: 0,
        },
    }
}

/// Collects sources for expanded topics across the configured lanes.
pub struct SourceCollector {
    generator: Arc<dyn TextGenerator>,
    providers: SearchProviders,
    worker_width: usize,
}

impl SourceCollector {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        providers: SearchProviders,
        worker_width: usize,
    ) -> Self {
        Self {
            generator,
            providers,
            worker_width: worker_width.max(1),
        }
    }

    /// Collect up to `max_sources` items for one expanded topic.
    ///
    /// Lanes with a zero allocation are skipped entirely. Within a lane,
    /// provider order is preserved; across lanes, results are concatenated
    /// in lane order (web, wikipedia, academic, news).
    pub async fn collect(
        &self,
        topic: &ExpandedTopic,
        include_academic: bool,
        include_news: bool,
        max_sources: usize,
    ) -> Vec<SourceItem> {
        let allocation = lane_allocation(max_sources, include_academic, include_news);
        let search_query = if topic.search_query.is_empty() {
            topic.title.clone()
        } else {
            topic.search_query.clone()
        };

        // (source_type, provider, query, budget), fixed lane order
        let lanes: Vec<(SourceType, Arc<dyn SearchProvider>, String, usize)> = vec![
            (
                SourceType::Web,
                self.providers.web.clone(),
                search_query.clone(),
                allocation.web,
            ),
            (
                SourceType::Wikipedia,
                self.providers.wikipedia.clone(),
                topic.title.clone(),
                allocation.wikipedia,
            ),
            (
                SourceType::Academic,
                self.providers.academic.clone(),
                search_query.clone(),
                allocation.academic,
            ),
            (
                SourceType::News,
                self.providers.web.clone(),
                format!("{search_query} news"),
                allocation.news,
            ),
        ];

        let semaphore = Arc::new(Semaphore::new(self.worker_width));
        let mut tasks: JoinSet<(usize, Vec<SourceItem>)> = JoinSet::new();

        for (lane_idx, (source_type, provider, query, budget)) in lanes.into_iter().enumerate() {
            if budget == 0 {
                continue;
            }
            let semaphore = semaphore.clone();
            let generator = self.generator.clone();
            let topic = topic.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let items =
                    search_and_extract(&*provider, &*generator, &query, &topic, source_type, budget)
                        .await;
                (lane_idx, items)
            });
        }

        // Join all lanes; concatenate in lane order so repeated runs with
        // deterministic collaborators produce identical output.
        let mut lane_results: Vec<(usize, Vec<SourceItem>)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => lane_results.push(result),
                Err(e) => tracing::error!(error = %e, "Collection lane task panicked"),
            }
        }
        lane_results.sort_by_key(|(lane_idx, _)| *lane_idx);

        let collected: Vec<SourceItem> = lane_results
            .into_iter()
            .flat_map(|(_, items)| items)
            .collect();
        tracing::info!(
            topic = %topic.title,
            count = collected.len(),
            "Collected sources for topic"
        );
        collected
    }
}

/// One lane: search the provider, then extract content per result.
///
/// Provider and extraction failures are caught here — the lane returns
/// whatever it managed to build, possibly nothing.
async fn search_and_extract(
    provider: &dyn SearchProvider,
    generator: &dyn TextGenerator,
    query: &str,
    topic: &ExpandedTopic,
    source_type: SourceType,
    max_results: usize,
) -> Vec<SourceItem> {
    let raw_results = match provider.search(query, max_results).await {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!(
                provider = provider.name(),
                lane = source_type.as_str(),
                error = %e,
                "Search lane failed, yielding empty result set"
            );
            return Vec::new();
        }
    };

    let mut items = Vec::with_capacity(raw_results.len());
    for raw in raw_results {
        let (extracted_content, raw_content) = extract_content(generator, &raw.content, query).await;
        items.push(SourceItem {
            title: raw.title,
            url: raw.url,
            source_type,
            query: query.to_string(),
            topic: topic.title.clone(),
            parent_topic: topic.parent_topic.clone(),
            extracted_content,
            raw_content,
            metadata: raw.metadata,
            collected_at: Utc::now(),
            reliability_score: 0.0,
            assessment: None,
            cross_verification: None,
        });
    }
    items
}

/// Extract the relevant portion of raw content via a generation call.
///
/// Returns `(extracted, retained_raw)`. On failure the extraction is a
/// fixed error marker and only a minimal raw slice is retained.
async fn extract_content(
    generator: &dyn TextGenerator,
    raw_content: &str,
    search_query: &str,
) -> (String, String) {
    let prompt = CONTENT_EXTRACTION_TEMPLATE
        .replace("{search_query}", search_query)
        .replace("{raw_content}", truncate_chars(raw_content, EXTRACTION_INPUT_CHARS));

    match generator.generate(&prompt).await {
        Ok(extracted) => (
            extracted,
            truncate_chars(raw_content, RAW_RETENTION_CHARS).to_string(),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Content extraction failed");
            (
                "Error extracting content.".to_string(),
                truncate_chars(raw_content, RAW_RETENTION_ON_ERROR_CHARS).to_string(),
            )
        }
    }
}
