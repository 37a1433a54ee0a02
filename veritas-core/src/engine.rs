//! The research engine: wires the stages together for one run.
//!
//! A run always completes with a structurally valid [`RunState`] holding
//! a final report. Stage failures degrade (empty collections, placeholder
//! syntheses) and are recorded in `state.errors`; only setup problems can
//! stop a run before it starts, and those are caught at construction.

use crate::collection::SourceCollector;
use crate::config::VeritasConfig;
use crate::discovery::TopicExpander;
use crate::generation::TextGenerator;
use crate::progress::ProgressSink;
use crate::providers::SearchProviders;
use crate::report::{CitationStyle, ReportBuilder};
use crate::synthesis::ContentSynthesizer;
use crate::types::{DepthLevel, RunState, Topic};
use crate::verification::{SourceVerifier, filter_by_threshold};
use std::sync::Arc;

// Stage labels, also used as RunState.current_stage values
const STAGE_EXPANDING: &str = "Expanding Topics";
const STAGE_COLLECTING: &str = "Collecting Data";
const STAGE_VERIFYING: &str = "Verifying Sources";
const STAGE_SYNTHESIZING: &str = "Synthesizing Content";
const STAGE_REPORTING: &str = "Assembling Report";
const STAGE_COMPLETE: &str = "Complete";

/// Input for one research run.
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    /// Caller-supplied run identifier, unique per run. The engine never
    /// generates or persists one.
    pub research_id: String,
    pub main_topic: String,
    /// Caller-supplied subtopics. When empty, the engine discovers them.
    pub subtopics: Vec<Topic>,
    pub depth: DepthLevel,
    pub include_academic: bool,
    pub include_news: bool,
}

impl ResearchRequest {
    pub fn new(research_id: impl Into<String>, main_topic: impl Into<String>) -> Self {
        Self {
            research_id: research_id.into(),
            main_topic: main_topic.into(),
            subtopics: Vec::new(),
            depth: DepthLevel::default(),
            include_academic: false,
            include_news: false,
        }
    }
}

/// Orchestrates expansion, collection, verification, synthesis, and
/// report assembly for research runs.
pub struct ResearchEngine {
    expander: TopicExpander,
    collector: SourceCollector,
    verifier: SourceVerifier,
    synthesizer: ContentSynthesizer,
    report_builder: ReportBuilder,
    max_sources: usize,
    verification_threshold: f64,
}

impl ResearchEngine {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        providers: SearchProviders,
        config: &VeritasConfig,
    ) -> Self {
        let width = config.research.worker_width;
        Self {
            expander: TopicExpander::new(generator.clone()),
            collector: SourceCollector::new(generator.clone(), providers, width),
            verifier: SourceVerifier::new(generator.clone(), width),
            synthesizer: ContentSynthesizer::new(generator.clone(), width),
            report_builder: ReportBuilder::new(
                generator,
                CitationStyle::parse(&config.research.citation_style),
                config.research.max_report_words,
            ),
            max_sources: config.research.max_sources,
            verification_threshold: config.research.verification_threshold,
        }
    }

    /// Execute one full research run.
    ///
    /// Progress moves through fixed stage windows: expansion ends at 0.2,
    /// collection at 0.5, verification at 0.6, synthesis at 0.8, and the
    /// report takes the run to 1.0.
    pub async fn run(&self, request: ResearchRequest, sink: &dyn ProgressSink) -> RunState {
        let mut state = RunState::new(
            request.research_id.clone(),
            request.main_topic.clone(),
            request.subtopics.clone(),
            request.depth,
            request.include_academic,
            request.include_news,
        );
        tracing::info!(
            research_id = %state.research_id,
            topic = %state.main_topic,
            depth = state.depth_level.as_str(),
            "Starting research run"
        );

        self.expand_stage(&mut state, sink).await;
        self.collect_stage(&mut state, sink).await;
        self.verify_stage(&mut state, sink).await;
        self.synthesize_stage(&mut state, sink).await;
        self.report_stage(&mut state, sink).await;

        set_progress(&mut state, sink, STAGE_COMPLETE, 1.0);
        tracing::info!(
            research_id = %state.research_id,
            sources = state.verified_data.len(),
            errors = state.errors.len(),
            "Research run complete"
        );
        state
    }

    async fn expand_stage(&self, state: &mut RunState, sink: &dyn ProgressSink) {
        set_progress(state, sink, STAGE_EXPANDING, 0.1);

        if state.subtopics.is_empty() {
            state.subtopics = self
                .expander
                .suggest_topics(&state.main_topic, state.depth_level)
                .await;
        }
        for subtopic in &state.subtopics {
            let mut expanded = self
                .expander
                .expand(&state.main_topic, subtopic, state.depth_level)
                .await;
            state.expanded_topics.append(&mut expanded);
        }

        tracing::info!(
            subtopics = state.subtopics.len(),
            expanded = state.expanded_topics.len(),
            "Topic expansion done"
        );
        set_progress(state, sink, STAGE_EXPANDING, 0.2);
    }

    async fn collect_stage(&self, state: &mut RunState, sink: &dyn ProgressSink) {
        set_progress(state, sink, STAGE_COLLECTING, 0.2);
        let total = state.expanded_topics.len();
        if total == 0 {
            state
                .errors
                .push("No expanded topics to collect sources for".to_string());
            set_progress(state, sink, STAGE_COLLECTING, 0.5);
            return;
        }

        let topics = state.expanded_topics.clone();
        for (done, topic) in topics.iter().enumerate() {
            let mut items = self
                .collector
                .collect(
                    topic,
                    state.include_academic,
                    state.include_news,
                    self.max_sources,
                )
                .await;
            if items.is_empty() {
                state
                    .errors
                    .push(format!("No sources collected for topic: {}", topic.title));
            }
            state.collected_data.append(&mut items);
            let frac = (done + 1) as f64 / total as f64;
            set_progress(state, sink, STAGE_COLLECTING, 0.2 + 0.3 * frac);
        }
    }

    async fn verify_stage(&self, state: &mut RunState, sink: &dyn ProgressSink) {
        set_progress(state, sink, STAGE_VERIFYING, 0.5);
        let items = state.collected_data.clone();
        let verified = self
            .verifier
            .verify(items, &|p| {
                sink.on_progress(STAGE_VERIFYING, 0.5 + p * 0.1);
            })
            .await;

        // Scored items replace the raw collection; the filtered view is
        // what synthesis and citations consume.
        state.collected_data = verified.clone();
        state.verified_data = filter_by_threshold(verified, self.verification_threshold);
        if state.verified_data.is_empty() && !state.collected_data.is_empty() {
            state.errors.push(format!(
                "No sources passed the reliability threshold of {}",
                self.verification_threshold
            ));
        }
        set_progress(state, sink, STAGE_VERIFYING, 0.6);
    }

    async fn synthesize_stage(&self, state: &mut RunState, sink: &dyn ProgressSink) {
        set_progress(state, sink, STAGE_SYNTHESIZING, 0.6);
        let titles = subtopic_titles(state);
        let content = self
            .synthesizer
            .synthesize(&state.main_topic, &titles, &state.verified_data, &|p| {
                sink.on_progress(STAGE_SYNTHESIZING, 0.6 + p * 0.2);
            })
            .await;
        state.synthesized_content = Some(content);
        set_progress(state, sink, STAGE_SYNTHESIZING, 0.8);
    }

    async fn report_stage(&self, state: &mut RunState, sink: &dyn ProgressSink) {
        set_progress(state, sink, STAGE_REPORTING, 0.8);
        let titles = subtopic_titles(state);
        let content = state.synthesized_content.clone().unwrap_or_default();
        let report = self
            .report_builder
            .build(&state.main_topic, &titles, &content, &state.verified_data)
            .await;
        state.final_report = Some(report);
    }
}

fn subtopic_titles(state: &RunState) -> Vec<String> {
    state.subtopics.iter().map(|t| t.title.clone()).collect()
}

fn set_progress(state: &mut RunState, sink: &dyn ProgressSink, stage: &str, progress: f64) {
    state.current_stage = stage.to_string();
    state.progress = progress;
    sink.on_progress(stage, progress);
}
