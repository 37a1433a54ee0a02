//! Core data model for a research run.
//!
//! Every record that flows between stages is a fixed, tagged struct —
//! no open-ended maps. `RunState` is the single mutable aggregate for a
//! run, owned by the engine and discarded once the report is extracted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Research depth level. Unrecognized strings fall back to `Standard`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DepthLevel {
    Basic,
    #[default]
    Standard,
    Comprehensive,
    Expert,
}

impl DepthLevel {
    /// Loose, case-insensitive parse with the `Standard` fallback.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "basic" => DepthLevel::Basic,
            "comprehensive" => DepthLevel::Comprehensive,
            "expert" => DepthLevel::Expert,
            _ => DepthLevel::Standard,
        }
    }

    /// How many subtopics the initial discovery step asks for.
    pub fn initial_topic_count(&self) -> usize {
        match self {
            DepthLevel::Basic => 3,
            DepthLevel::Standard => 5,
            DepthLevel::Comprehensive => 8,
            DepthLevel::Expert => 12,
        }
    }

    /// How many expansion points each subtopic is expanded into.
    pub fn expansion_count(&self) -> usize {
        match self {
            DepthLevel::Basic => 2,
            DepthLevel::Standard => 3,
            DepthLevel::Comprehensive => 4,
            DepthLevel::Expert => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DepthLevel::Basic => "Basic",
            DepthLevel::Standard => "Standard",
            DepthLevel::Comprehensive => "Comprehensive",
            DepthLevel::Expert => "Expert",
        }
    }
}

/// A subtopic at discovery time, before expansion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topic {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub questions: Vec<String>,
}

impl Topic {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            questions: Vec::new(),
        }
    }
}

/// A subtopic expanded into a concrete search target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpandedTopic {
    pub title: String,
    pub search_query: String,
    #[serde(default)]
    pub source_types: Vec<String>,
    pub parent_topic: String,
}

/// The kind of lane a source item was collected from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Web,
    Wikipedia,
    Academic,
    News,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Web => "web",
            SourceType::Wikipedia => "wikipedia",
            SourceType::Academic => "academic",
            SourceType::News => "news",
        }
    }
}

/// Per-dimension reliability assessment produced by phase A verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceAssessment {
    pub consistency_score: f64,
    pub credibility_score: f64,
    pub accuracy_score: f64,
    pub bias_score: f64,
    pub completeness_score: f64,
    pub overall_score: f64,
    #[serde(default)]
    pub issues_identified: Vec<String>,
    #[serde(default)]
    pub verification_notes: String,
}

impl SourceAssessment {
    /// Neutral assessment used when scoring fails. Every dimension is 0.5.
    pub fn neutral(notes: impl Into<String>) -> Self {
        Self {
            consistency_score: 0.5,
            credibility_score: 0.5,
            accuracy_score: 0.5,
            bias_score: 0.5,
            completeness_score: 0.5,
            overall_score: 0.5,
            issues_identified: vec!["Verification process failed".to_string()],
            verification_notes: notes.into(),
        }
    }

    /// Clamp every dimension into [0, 1]; models occasionally overshoot.
    pub fn clamped(mut self) -> Self {
        self.consistency_score = self.consistency_score.clamp(0.0, 1.0);
        self.credibility_score = self.credibility_score.clamp(0.0, 1.0);
        self.accuracy_score = self.accuracy_score.clamp(0.0, 1.0);
        self.bias_score = self.bias_score.clamp(0.0, 1.0);
        self.completeness_score = self.completeness_score.clamp(0.0, 1.0);
        self.overall_score = self.overall_score.clamp(0.0, 1.0);
        self
    }
}

/// Result of comparing the two most reliable same-topic items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CrossVerification {
    #[serde(default)]
    pub agreements: Vec<String>,
    #[serde(default)]
    pub disagreements: Vec<String>,
    #[serde(default)]
    pub unique_source1: Vec<String>,
    #[serde(default)]
    pub unique_source2: Vec<String>,
    #[serde(default)]
    pub more_reliable_source: String,
    #[serde(default)]
    pub cross_verification_notes: String,
}

/// The unit flowing through collection → verification → synthesis.
///
/// Mutated in place by the verifier; read-only downstream of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceItem {
    pub title: String,
    pub url: String,
    pub source_type: SourceType,
    pub query: String,
    pub topic: String,
    pub parent_topic: String,
    pub extracted_content: String,
    pub raw_content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub collected_at: DateTime<Utc>,
    /// Reliability in [0, 1]. Initialized from `overall_score` in phase A,
    /// then adjusted (clamped to [0.1, 1.0]) by cross-verification.
    #[serde(default)]
    pub reliability_score: f64,
    #[serde(default)]
    pub assessment: Option<SourceAssessment>,
    #[serde(default)]
    pub cross_verification: Option<CrossVerification>,
}

/// Synthesis of the verified items belonging to one subtopic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicSynthesis {
    pub topic: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub consensus_points: Vec<String>,
    #[serde(default)]
    pub contradictions: Vec<String>,
    #[serde(default)]
    pub information_gaps: Vec<String>,
    #[serde(default)]
    pub synthesis: String,
    #[serde(default)]
    pub key_sources: Vec<String>,
}

/// The overall synthesis across all subtopics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SynthesizedContent {
    #[serde(default)]
    pub main_themes: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub further_research: Vec<String>,
    #[serde(default)]
    pub overall_synthesis: String,
    #[serde(default)]
    pub topic_syntheses: Vec<TopicSynthesis>,
}

/// One section of the final report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSection {
    pub title: String,
    pub content: String,
}

/// The final assembled report. Always structurally complete, even when
/// every generation call failed — placeholder content at worst.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub title: String,
    pub summary: String,
    pub sections: Vec<ReportSection>,
    #[serde(default)]
    pub conclusion: String,
    #[serde(default)]
    pub references: Vec<String>,
}

/// The single mutable aggregate for one research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub research_id: String,
    pub main_topic: String,
    pub subtopics: Vec<Topic>,
    pub depth_level: DepthLevel,
    pub include_academic: bool,
    pub include_news: bool,
    pub expanded_topics: Vec<ExpandedTopic>,
    pub collected_data: Vec<SourceItem>,
    pub verified_data: Vec<SourceItem>,
    pub synthesized_content: Option<SynthesizedContent>,
    pub final_report: Option<Report>,
    pub current_stage: String,
    pub progress: f64,
    pub errors: Vec<String>,
}

impl RunState {
    pub fn new(
        research_id: impl Into<String>,
        main_topic: impl Into<String>,
        subtopics: Vec<Topic>,
        depth_level: DepthLevel,
        include_academic: bool,
        include_news: bool,
    ) -> Self {
        Self {
            research_id: research_id.into(),
            main_topic: main_topic.into(),
            subtopics,
            depth_level,
            include_academic,
            include_news,
            expanded_topics: Vec::new(),
            collected_data: Vec::new(),
            verified_data: Vec::new(),
            synthesized_content: None,
            final_report: None,
            current_stage: "init".to_string(),
            progress: 0.0,
            errors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_parse_exact() {
        assert_eq!(DepthLevel::parse("Basic"), DepthLevel::Basic);
        assert_eq!(DepthLevel::parse("Standard"), DepthLevel::Standard);
        assert_eq!(DepthLevel::parse("Comprehensive"), DepthLevel::Comprehensive);
        assert_eq!(DepthLevel::parse("Expert"), DepthLevel::Expert);
    }

    #[test]
    fn test_depth_parse_fallback() {
        assert_eq!(DepthLevel::parse("deep"), DepthLevel::Standard);
        assert_eq!(DepthLevel::parse(""), DepthLevel::Standard);
        assert_eq!(DepthLevel::parse("EXPERT"), DepthLevel::Expert);
    }

    #[test]
    fn test_depth_tables() {
        let levels = [
            (DepthLevel::Basic, 3, 2),
            (DepthLevel::Standard, 5, 3),
            (DepthLevel::Comprehensive, 8, 4),
            (DepthLevel::Expert, 12, 5),
        ];
        for (level, topics, expansions) in levels {
            assert_eq!(level.initial_topic_count(), topics);
            assert_eq!(level.expansion_count(), expansions);
        }
    }

    #[test]
    fn test_assessment_clamp() {
        let assessment = SourceAssessment {
            consistency_score: 1.4,
            credibility_score: -0.2,
            accuracy_score: 0.5,
            bias_score: 0.5,
            completeness_score: 0.5,
            overall_score: 2.0,
            issues_identified: vec![],
            verification_notes: String::new(),
        }
        .clamped();
        assert_eq!(assessment.consistency_score, 1.0);
        assert_eq!(assessment.credibility_score, 0.0);
        assert_eq!(assessment.overall_score, 1.0);
    }

    #[test]
    fn test_neutral_assessment() {
        let assessment = SourceAssessment::neutral("llm down");
        assert_eq!(assessment.overall_score, 0.5);
        assert_eq!(
            assessment.issues_identified,
            vec!["Verification process failed".to_string()]
        );
    }

    #[test]
    fn test_run_state_initial_fields() {
        let state = RunState::new(
            "run-1",
            "Solar Energy",
            vec![Topic::new("Photovoltaics")],
            DepthLevel::Basic,
            false,
            false,
        );
        assert_eq!(state.current_stage, "init");
        assert_eq!(state.progress, 0.0);
        assert!(state.expanded_topics.is_empty());
        assert!(state.final_report.is_none());
    }

    #[test]
    fn test_source_type_serde_snake_case() {
        let json = serde_json::to_string(&SourceType::Wikipedia).unwrap();
        assert_eq!(json, "\"wikipedia\"");
    }
}
