//! Content synthesis: per-subtopic digests, then one cross-topic view.
//!
//! Verified items are grouped under the run's subtopic titles: a direct
//! `topic` match wins, otherwise the group falls back to `parent_topic`
//! matches. Groups are synthesized concurrently on the bounded pool, in
//! the same degrade-don't-abort style as the other stages: a failed
//! group gets a placeholder digest, a failed overall pass still returns
//! a structurally complete [`SynthesizedContent`].

use crate::generation::TextGenerator;
use crate::payload::{parse_payload, truncate_chars};
use crate::types::{SourceItem, SynthesizedContent, TopicSynthesis};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Per-source content budget inside a synthesis prompt.
const SOURCE_CONTENT_CHARS: usize = 1000;

const TOPIC_SYNTHESIS_TEMPLATE: &str = "\
You are a research analyst synthesizing information from multiple verified sources.

Research Topic: {topic}

Sources:
{sources}

Please synthesize the information across these sources. Weigh each source by its \
reliability score. Identify:
1. The key findings about this topic
2. Points on which the sources reach consensus
3. Contradictions or disagreements between sources
4. Gaps where information is missing or inconclusive
5. A coherent narrative synthesis (2-4 paragraphs)

Your response should be in the following JSON format:
```json
{
  \"key_findings\": [\"Finding 1\"],
  \"consensus_points\": [\"Consensus 1\"],
  \"contradictions\": [\"Contradiction 1\"],
  \"information_gaps\": [\"Gap 1\"],
  \"synthesis\": \"Narrative synthesis of the topic\"
}
```";

const OVERALL_SYNTHESIS_TEMPLATE: &str = "\
You are a research analyst producing an integrated view across research topics.

Main Research Topic: {main_topic}

Topic Syntheses:
{topic_syntheses}

Please integrate these topic-level syntheses into an overall picture. Identify:
1. The main themes that cut across topics
2. Relationships and dependencies between topics
3. Recurring patterns in the findings
4. Directions for further research
5. An overall narrative synthesis (3-5 paragraphs)

Your response should be in the following JSON format:
```json
{
  \"main_themes\": [\"Theme 1\"],
  \"relationships\": [\"Relationship 1\"],
  \"patterns\": [\"Pattern 1\"],
  \"further_research\": [\"Direction 1\"],
  \"overall_synthesis\": \"Integrated narrative across all topics\"
}
```";

#[derive(Debug, Deserialize)]
struct TopicSynthesisPayload {
    #[serde(default)]
    key_findings: Vec<String>,
    #[serde(default)]
    consensus_points: Vec<String>,
    #[serde(default)]
    contradictions: Vec<String>,
    #[serde(default)]
    information_gaps: Vec<String>,
    #[serde(default)]
    synthesis: String,
}

#[derive(Debug, Deserialize)]
struct OverallPayload {
    #[serde(default)]
    main_themes: Vec<String>,
    #[serde(default)]
    relationships: Vec<String>,
    #[serde(default)]
    patterns: Vec<String>,
    #[serde(default)]
    further_research: Vec<String>,
    #[serde(default)]
    overall_synthesis: String,
}

/// Synthesizes verified sources into topic digests and an overall view.
pub struct ContentSynthesizer {
    generator: Arc<dyn TextGenerator>,
    worker_width: usize,
}

impl ContentSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, worker_width: usize) -> Self {
        Self {
            generator,
            worker_width: worker_width.max(1),
        }
    }

    /// Synthesize all verified items for a run, grouped under the given
    /// subtopic titles (in order).
    ///
    /// `progress` receives the stage-internal fraction in [0, 1]; topic
    /// digests advance it to 0.8, the overall pass completes it.
    pub async fn synthesize(
        &self,
        main_topic: &str,
        subtopic_titles: &[String],
        items: &[SourceItem],
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> SynthesizedContent {
        let groups = group_by_subtopic(subtopic_titles, items);
        if groups.is_empty() {
            progress(1.0);
            return SynthesizedContent {
                overall_synthesis: format!(
                    "No verified sources were available to synthesize for {main_topic}."
                ),
                ..Default::default()
            };
        }

        let topic_syntheses = self.synthesize_topics(&groups, progress).await;
        progress(0.8);
        let mut content = self.synthesize_overall(main_topic, &topic_syntheses).await;
        content.topic_syntheses = topic_syntheses;
        progress(1.0);
        content
    }

    /// Digest each topic group on the pool; output follows group order.
    async fn synthesize_topics(
        &self,
        groups: &[(String, Vec<SourceItem>)],
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Vec<TopicSynthesis> {
        let total = groups.len();
        let semaphore = Arc::new(Semaphore::new(self.worker_width));
        let mut tasks: JoinSet<(usize, TopicSynthesis)> = JoinSet::new();

        for (index, (topic, group)) in groups.iter().enumerate() {
            let semaphore = semaphore.clone();
            let generator = self.generator.clone();
            let topic = topic.clone();
            let group = group.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let synthesis = synthesize_one_topic(&*generator, &topic, &group).await;
                (index, synthesis)
            });
        }

        let mut slots: Vec<Option<TopicSynthesis>> = (0..total).map(|_| None).collect();
        let mut done = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, synthesis)) => {
                    slots[index] = Some(synthesis);
                    done += 1;
                    progress((done as f64 / total as f64) * 0.8);
                }
                Err(e) => tracing::error!(error = %e, "Topic synthesis task panicked"),
            }
        }
        slots.into_iter().flatten().collect()
    }

    async fn synthesize_overall(
        &self,
        main_topic: &str,
        topic_syntheses: &[TopicSynthesis],
    ) -> SynthesizedContent {
        let digest = topic_syntheses
            .iter()
            .map(|ts| format!("## {}\n{}", ts.topic, ts.synthesis))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = OVERALL_SYNTHESIS_TEMPLATE
            .replace("{main_topic}", main_topic)
            .replace("{topic_syntheses}", &digest);

        let fallback = || SynthesizedContent {
            overall_synthesis: format!(
                "Overall synthesis unavailable for {main_topic}; refer to the \
                 individual topic syntheses."
            ),
            ..Default::default()
        };

        let text = match self.generator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Overall synthesis call failed");
                return fallback();
            }
        };
        match parse_payload::<OverallPayload>(&text) {
            Ok(payload) => SynthesizedContent {
                main_themes: payload.main_themes,
                relationships: payload.relationships,
                patterns: payload.patterns,
                further_research: payload.further_research,
                overall_synthesis: payload.overall_synthesis,
                topic_syntheses: Vec::new(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Overall synthesis payload unparsable");
                fallback()
            }
        }
    }
}

/// Group items under subtopic titles in title order. A direct `topic`
/// match wins; when a title has none (items carry expanded-topic titles
/// in `topic`), its `parent_topic` matches form the group. Titles with
/// no items at all produce no group.
fn group_by_subtopic(
    subtopic_titles: &[String],
    items: &[SourceItem],
) -> Vec<(String, Vec<SourceItem>)> {
    let mut groups = Vec::new();
    for title in subtopic_titles {
        let mut group: Vec<SourceItem> = items
            .iter()
            .filter(|item| item.topic == *title)
            .cloned()
            .collect();
        if group.is_empty() {
            group = items
                .iter()
                .filter(|item| item.parent_topic == *title)
                .cloned()
                .collect();
        }
        if !group.is_empty() {
            groups.push((title.clone(), group));
        }
    }
    groups
}

/// Digest one topic group; failures yield a placeholder synthesis.
async fn synthesize_one_topic(
    generator: &dyn TextGenerator,
    topic: &str,
    group: &[SourceItem],
) -> TopicSynthesis {
    let sources_block = group
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "Source {} (reliability {:.2}): {}\n{}",
                i + 1,
                item.reliability_score,
                item.title,
                truncate_chars(&item.extracted_content, SOURCE_CONTENT_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = TOPIC_SYNTHESIS_TEMPLATE
        .replace("{topic}", topic)
        .replace("{sources}", &sources_block);

    let key_sources: Vec<String> = group.iter().map(|item| item.url.clone()).collect();

    let placeholder = |note: &str| TopicSynthesis {
        topic: topic.to_string(),
        key_findings: Vec::new(),
        consensus_points: Vec::new(),
        contradictions: Vec::new(),
        information_gaps: Vec::new(),
        synthesis: note.to_string(),
        key_sources: key_sources.clone(),
    };

    let text = match generator.generate(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(topic, error = %e, "Topic synthesis call failed");
            return placeholder("Synthesis unavailable for this topic.");
        }
    };
    match parse_payload::<TopicSynthesisPayload>(&text) {
        Ok(payload) => TopicSynthesis {
            topic: topic.to_string(),
            key_findings: payload.key_findings,
            consensus_points: payload.consensus_points,
            contradictions: payload.contradictions,
            information_gaps: payload.information_gaps,
            synthesis: payload.synthesis,
            key_sources,
        },
        Err(e) => {
            tracing::warn!(topic, error = %e, "Topic synthesis payload unparsable");
            placeholder("Synthesis unavailable for this topic.")
        }
    }
}
