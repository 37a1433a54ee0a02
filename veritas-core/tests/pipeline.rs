//! Integration tests for the research pipeline.
//!
//! These exercise the full engine end-to-end with MockGenerator and
//! canned search providers, covering the happy path, failure isolation,
//! reliability gating, and run-to-run determinism.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use veritas_core::error::ProviderError;
use veritas_core::providers::RawResult;
use veritas_core::{
    DepthLevel, MockGenerator, NoOpProgressSink, ResearchEngine, ResearchRequest, SearchProvider,
    SearchProviders, SourceType, StaticSearchProvider, Topic, VeritasConfig,
};

const EXPANSION_RESPONSE: &str = r#"```json
[
  {"title": "Panel Efficiency", "search_query": "solar panel efficiency improvements", "source_types": ["Web articles"]},
  {"title": "Grid Storage", "search_query": "grid scale battery storage for solar", "source_types": ["Research papers"]}
]
```"#;

/// Assessment JSON used as the generator fallback. Doubles as a parsable
/// payload for every later stage thanks to serde defaults, which keeps
/// the whole run deterministic with a single canned response.
fn assessment_fallback(overall: f64) -> String {
    format!(
        r#"{{"consistency_score": 0.8, "credibility_score": 0.8, "accuracy_score": 0.8,
  "bias_score": 0.8, "completeness_score": 0.8, "overall_score": {overall},
  "issues_identified": [], "verification_notes": "ok"}}"#
    )
}

fn config(max_sources: usize) -> VeritasConfig {
    let mut config = VeritasConfig::default();
    config.research.max_sources = max_sources;
    config
}

fn request() -> ResearchRequest {
    ResearchRequest {
        research_id: "run-integration".to_string(),
        main_topic: "Solar Energy".to_string(),
        subtopics: vec![Topic::new("Photovoltaics")],
        depth: DepthLevel::Basic,
        include_academic: false,
        include_news: false,
    }
}

/// Provider that records every (lane-name, query) invocation.
struct RecordingProvider {
    name: String,
    calls: Arc<Mutex<Vec<String>>>,
    inner: StaticSearchProvider,
}

impl RecordingProvider {
    fn new(name: &str, calls: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            calls,
            inner: StaticSearchProvider::with_count(name, 10),
        }
    }
}

#[async_trait]
impl SearchProvider for RecordingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<RawResult>, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{query}", self.name));
        self.inner.search(query, max_results).await
    }
}

/// Provider that always fails.
struct AlwaysFailing;

#[async_trait]
impl SearchProvider for AlwaysFailing {
    fn name(&self) -> &str {
        "always-failing"
    }

    async fn search(&self, _q: &str, _n: usize) -> Result<Vec<RawResult>, ProviderError> {
        Err(ProviderError::RequestFailed {
            provider: "always-failing".to_string(),
            message: "injected failure".to_string(),
        })
    }
}

#[tokio::test]
async fn full_run_produces_verified_report() {
    let generator = Arc::new(MockGenerator::with_response(assessment_fallback(0.8)));
    // The first generation call is the (sequential) topic expansion
    generator.queue_response(EXPANSION_RESPONSE);
    let providers = SearchProviders::uniform(Arc::new(StaticSearchProvider::with_count("s", 10)));
    let engine = ResearchEngine::new(generator, providers, &config(10));

    let state = engine.run(request(), &NoOpProgressSink).await;

    assert_eq!(state.current_stage, "Complete");
    assert_eq!(state.progress, 1.0);
    assert_eq!(state.expanded_topics.len(), 2);
    assert_eq!(state.expanded_topics[0].parent_topic, "Photovoltaics");

    // 10 sources split web 8 / wikipedia 2 for each of the two topics
    assert_eq!(state.collected_data.len(), 20);
    assert_eq!(state.verified_data.len(), 20);
    assert!(
        state
            .verified_data
            .iter()
            .all(|item| item.reliability_score >= 0.7)
    );
    assert!(
        state
            .verified_data
            .iter()
            .all(|item| item.assessment.is_some())
    );

    let report = state.final_report.expect("run must yield a report");
    assert!(report.title.contains("Solar Energy"));
    // All sources clear the citation bar, but references dedupe by URL
    // and the canned provider serves the same URLs to every lane: the
    // web lane's eight hits cover the wikipedia lane's two
    assert_eq!(report.references.len(), 8);

    // Both expanded topics share the one requested subtopic as parent,
    // so synthesis produces a single group for it
    let synthesized = state.synthesized_content.expect("synthesis always present");
    assert_eq!(synthesized.topic_syntheses.len(), 1);
    assert_eq!(synthesized.topic_syntheses[0].topic, "Photovoltaics");
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let make_engine = || {
        let generator = Arc::new(MockGenerator::with_response(assessment_fallback(0.8)));
        generator.queue_response(EXPANSION_RESPONSE);
        let providers =
            SearchProviders::uniform(Arc::new(StaticSearchProvider::with_count("s", 10)));
        ResearchEngine::new(generator, providers, &config(10))
    };

    let first = make_engine().run(request(), &NoOpProgressSink).await;
    let second = make_engine().run(request(), &NoOpProgressSink).await;

    assert_eq!(first.final_report, second.final_report);
    let titles = |state: &veritas_core::RunState| {
        state
            .verified_data
            .iter()
            .map(|i| (i.title.clone(), i.topic.clone(), i.reliability_score))
            .collect::<Vec<_>>()
    };
    assert_eq!(titles(&first), titles(&second));
}

#[tokio::test]
async fn academic_lane_failure_does_not_poison_the_run() {
    let generator = Arc::new(MockGenerator::with_response(assessment_fallback(0.8)));
    generator.queue_response(EXPANSION_RESPONSE);
    let providers = SearchProviders {
        web: Arc::new(StaticSearchProvider::with_count("web", 10)),
        wikipedia: Arc::new(StaticSearchProvider::with_count("wiki", 10)),
        academic: Arc::new(AlwaysFailing),
    };
    let engine = ResearchEngine::new(generator, providers, &config(10));

    let mut req = request();
    req.include_academic = true;
    let state = engine.run(req, &NoOpProgressSink).await;

    assert_eq!(state.current_stage, "Complete");
    assert!(!state.collected_data.is_empty());
    assert!(
        state
            .collected_data
            .iter()
            .all(|item| item.source_type != SourceType::Academic)
    );
    assert!(state.final_report.is_some());
}

#[tokio::test]
async fn disabled_lanes_are_never_queried() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let generator = Arc::new(MockGenerator::with_response(assessment_fallback(0.8)));
    generator.queue_response(EXPANSION_RESPONSE);
    let providers = SearchProviders {
        web: Arc::new(RecordingProvider::new("web", calls.clone())),
        wikipedia: Arc::new(RecordingProvider::new("wiki", calls.clone())),
        academic: Arc::new(RecordingProvider::new("arxiv", calls.clone())),
    };
    let engine = ResearchEngine::new(generator, providers, &config(10));

    engine.run(request(), &NoOpProgressSink).await;

    let calls = calls.lock().unwrap();
    assert!(calls.iter().any(|c| c.starts_with("web:")));
    assert!(calls.iter().any(|c| c.starts_with("wiki:")));
    // academic and news off: no arxiv queries, no news-suffixed queries
    assert!(!calls.iter().any(|c| c.starts_with("arxiv:")));
    assert!(!calls.iter().any(|c| c.ends_with(" news")));
}

#[tokio::test]
async fn low_reliability_sources_are_gated_out() {
    let generator = Arc::new(MockGenerator::with_response(assessment_fallback(0.4)));
    generator.queue_response(EXPANSION_RESPONSE);
    let providers = SearchProviders::uniform(Arc::new(StaticSearchProvider::with_count("s", 10)));
    let engine = ResearchEngine::new(generator, providers, &config(10));

    let state = engine.run(request(), &NoOpProgressSink).await;

    assert!(!state.collected_data.is_empty());
    assert!(state.verified_data.is_empty());
    assert!(
        state
            .errors
            .iter()
            .any(|e| e.contains("reliability threshold"))
    );

    // The report still exists, with no references
    let report = state.final_report.expect("report must exist");
    assert!(report.references.is_empty());
}
