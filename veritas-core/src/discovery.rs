//! Topic discovery and expansion.
//!
//! Two generation-backed steps: `suggest_topics` proposes the initial
//! subtopics for a main topic, and `expand` turns one subtopic into N
//! concrete search targets. Both degrade to a single deterministic
//! synthetic record on any generation or parse failure — neither ever
//! returns an error to the orchestrator.

use crate::error::GenerationError;
use crate::generation::TextGenerator;
use crate::payload::parse_payload;
use crate::types::{DepthLevel, ExpandedTopic, Topic};
use serde::Deserialize;
use std::sync::Arc;

const TOPIC_DISCOVERY_TEMPLATE: &str = "\
You are a research expert helping to identify key aspects of a research topic.

Research Topic: {main_topic}
Research Depth: {depth_level}

Please identify {num_topics} key aspects or subtopics that should be investigated to \
comprehensively understand this topic. For each aspect, provide:
1. A clear, concise title (3-7 words)
2. A brief description of why this aspect is important (1-2 sentences)
3. 2-3 key questions that should be answered about this aspect

Your response should be in the following JSON format:
```json
[
  {
    \"title\": \"Aspect Title\",
    \"description\": \"Brief description of importance\",
    \"questions\": [\"Question 1?\", \"Question 2?\"]
  }
]
```

The aspects should be complementary and cover different dimensions of the topic \
without excessive overlap.";

const TOPIC_EXPANSION_TEMPLATE: &str = "\
You are a research expert expanding on a specific aspect of a broader research topic.

Main Research Topic: {main_topic}
Specific Aspect: {subtopic_title}
Description: {subtopic_description}
Key Questions: {subtopic_questions}
Research Depth: {depth_level}

Based on the research depth ({depth_level}), please expand this aspect into \
{num_expansions} more specific research points that should be investigated. \
These will guide data collection efforts.

For each expanded point, provide:
1. A focused title (4-8 words)
2. A clear search query that would help find information on this point (15-25 words)
3. 1-2 specific source types that would be valuable

Your response should be in the following JSON format:
```json
[
  {
    \"title\": \"Expanded Point Title\",
    \"search_query\": \"Specific search query to find information on this point\",
    \"source_types\": [\"Source type 1\", \"Source type 2\"]
  }
]
```

The expanded points should be detailed enough to guide focused research and data collection.";

/// Payload shape of one expansion point, before the parent tag is added.
#[derive(Debug, Deserialize)]
struct ExpansionPayload {
    title: String,
    search_query: String,
    #[serde(default)]
    source_types: Vec<String>,
}

/// Discovers and expands research topics through the generation gateway.
pub struct TopicExpander {
    generator: Arc<dyn TextGenerator>,
}

impl TopicExpander {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Suggest the initial subtopics for a main topic.
    ///
    /// The number of suggestions follows the depth table (Basic 3,
    /// Standard 5, Comprehensive 8, Expert 12). Falls back to a single
    /// overview topic on failure.
    pub async fn suggest_topics(&self, main_topic: &str, depth: DepthLevel) -> Vec<Topic> {
        let prompt = TOPIC_DISCOVERY_TEMPLATE
            .replace("{main_topic}", main_topic)
            .replace("{depth_level}", depth.as_str())
            .replace("{num_topics}", &depth.initial_topic_count().to_string());

        match self.request_payload::<Vec<Topic>>(&prompt).await {
            Ok(topics) if !topics.is_empty() => {
                tracing::debug!(count = topics.len(), "Suggested research aspects");
                topics
            }
            Ok(_) | Err(_) => vec![Topic {
                title: format!("{main_topic} - Overview"),
                description: format!("General overview of {main_topic}"),
                questions: vec![
                    format!("What is {main_topic}?"),
                    format!("Why is {main_topic} important?"),
                ],
            }],
        }
    }

    /// Expand a subtopic into depth-table-many search targets, each tagged
    /// with its parent topic. Falls back to one synthetic point derived
    /// from the subtopic title on failure.
    pub async fn expand(
        &self,
        main_topic: &str,
        subtopic: &Topic,
        depth: DepthLevel,
    ) -> Vec<ExpandedTopic> {
        let prompt = TOPIC_EXPANSION_TEMPLATE
            .replace("{main_topic}", main_topic)
            .replace("{subtopic_title}", &subtopic.title)
            .replace("{subtopic_description}", &subtopic.description)
            .replace("{subtopic_questions}", &subtopic.questions.join("; "))
            .replace("{depth_level}", depth.as_str())
            .replace("{num_expansions}", &depth.expansion_count().to_string());

        match self.request_payload::<Vec<ExpansionPayload>>(&prompt).await {
            Ok(points) if !points.is_empty() => points
                .into_iter()
                .map(|p| ExpandedTopic {
                    title: p.title,
                    search_query: p.search_query,
                    source_types: p.source_types,
                    parent_topic: subtopic.title.clone(),
                })
                .collect(),
            Ok(_) | Err(_) => vec![ExpandedTopic {
                title: format!("{} - Detail", subtopic.title),
                search_query: format!("{main_topic} {} research", subtopic.title),
                source_types: vec!["Web articles".to_string(), "Research papers".to_string()],
                parent_topic: subtopic.title.clone(),
            }],
        }
    }

    async fn request_payload<T: serde::de::DeserializeOwned>(
        &self,
        prompt: &str,
    ) -> Result<T, GenerationError> {
        let text = self.generator.generate(prompt).await.inspect_err(|e| {
            tracing::warn!(error = %e, "Topic expansion generation failed, using fallback");
        })?;
        parse_payload(&text).map_err(|e| {
            tracing::warn!(error = %e, "Topic expansion payload unparsable, using fallback");
            GenerationError::ApiRequest {
                message: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::MockGenerator;

    fn subtopic() -> Topic {
        Topic {
            title: "Grid Integration".to_string(),
            description: "How solar connects to the grid".to_string(),
            questions: vec!["How is output balanced?".to_string()],
        }
    }

    #[tokio::test]
    async fn test_expand_parses_payload_and_tags_parent() {
        let response = r#"```json
[
  {"title": "Inverter technology", "search_query": "solar inverter grid synchronization methods", "source_types": ["industry reports"]},
  {"title": "Storage pairing", "search_query": "battery storage paired with photovoltaic plants", "source_types": ["academic papers"]}
]
```"#;
        let expander = TopicExpander::new(Arc::new(MockGenerator::with_response(response)));
        let expanded = expander
            .expand("Solar Energy", &subtopic(), DepthLevel::Basic)
            .await;
        assert_eq!(expanded.len(), 2);
        assert!(expanded.iter().all(|t| t.parent_topic == "Grid Integration"));
        assert_eq!(expanded[0].title, "Inverter technology");
    }

    #[tokio::test]
    async fn test_expand_generation_failure_yields_fallback() {
        let expander = TopicExpander::new(Arc::new(MockGenerator::failing()));
        let expanded = expander
            .expand("Solar Energy", &subtopic(), DepthLevel::Expert)
            .await;
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].title, "Grid Integration - Detail");
        assert_eq!(expanded[0].parent_topic, "Grid Integration");
        assert_eq!(
            expanded[0].search_query,
            "Solar Energy Grid Integration research"
        );
    }

    #[tokio::test]
    async fn test_expand_parse_failure_yields_fallback() {
        let expander =
            TopicExpander::new(Arc::new(MockGenerator::with_response("not json at all")));
        let expanded = expander
            .expand("Solar Energy", &subtopic(), DepthLevel::Standard)
            .await;
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].parent_topic, "Grid Integration");
    }

    #[tokio::test]
    async fn test_suggest_topics_fallback() {
        let expander = TopicExpander::new(Arc::new(MockGenerator::failing()));
        let topics = expander.suggest_topics("Solar Energy", DepthLevel::Basic).await;
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].title, "Solar Energy - Overview");
        assert_eq!(topics[0].questions.len(), 2);
    }

    #[tokio::test]
    async fn test_suggest_topics_parses_payload() {
        let response = r#"```json
[
  {"title": "Photovoltaics", "description": "Core technology", "questions": ["How efficient?"]},
  {"title": "Policy", "description": "Incentives", "questions": []},
  {"title": "Economics", "description": "Costs", "questions": []}
]
```"#;
        let expander = TopicExpander::new(Arc::new(MockGenerator::with_response(response)));
        let topics = expander.suggest_topics("Solar Energy", DepthLevel::Basic).await;
        assert_eq!(topics.len(), 3);
        assert_eq!(topics[1].title, "Policy");
    }

    #[tokio::test]
    async fn test_prompt_embeds_depth_counts() {
        // The expansion count table is exercised through the prompt text
        for (depth, expected) in [
            (DepthLevel::Basic, "2"),
            (DepthLevel::Standard, "3"),
            (DepthLevel::Comprehensive, "4"),
            (DepthLevel::Expert, "5"),
        ] {
            let prompt = TOPIC_EXPANSION_TEMPLATE
                .replace("{num_expansions}", &depth.expansion_count().to_string());
            assert!(prompt.contains(&format!("into {expected} more specific")));
        }
    }
}
