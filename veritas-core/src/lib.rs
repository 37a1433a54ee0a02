//! # Veritas Core
//!
//! Core library for the Veritas research pipeline.
//! Provides the research engine, the five stage implementations (topic
//! expansion, source collection, verification, synthesis, and report
//! assembly), the generation and search gateways, configuration, and
//! the run data model.

pub mod collection;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod generation;
pub mod payload;
pub mod progress;
pub mod providers;
pub mod report;
pub mod synthesis;
pub mod types;
pub mod verification;

// Re-export commonly used types at the crate root.
pub use config::{GenerationConfig, ResearchConfig, RetryConfig, VeritasConfig, load_config};
pub use engine::{ResearchEngine, ResearchRequest};
pub use error::{Result, VeritasError};
pub use generation::{MockGenerator, OpenAiCompatibleGenerator, TextGenerator};
pub use progress::{NoOpProgressSink, ProgressSink, TracingProgressSink};
pub use providers::{SearchProvider, SearchProviders, StaticSearchProvider};
pub use report::CitationStyle;
pub use types::{
    DepthLevel, ExpandedTopic, Report, ReportSection, RunState, SourceItem, SourceType,
    SynthesizedContent, Topic, TopicSynthesis,
};
