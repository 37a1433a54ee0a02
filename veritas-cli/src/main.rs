//! Veritas CLI — run a research pipeline from the terminal.
//!
//! Takes a topic, runs the full expansion/collection/verification/
//! synthesis/report flow, and prints the report as Markdown (or the
//! whole run state as JSON).

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use veritas_core::{
    DepthLevel, MockGenerator, NoOpProgressSink, OpenAiCompatibleGenerator, ProgressSink, Report,
    ResearchEngine, ResearchRequest, SearchProviders, StaticSearchProvider, TextGenerator, Topic,
};

/// Veritas: a verification-first research pipeline
#[derive(Parser, Debug)]
#[command(name = "veritas", version, about, long_about = None)]
struct Cli {
    /// Main research topic
    topic: String,

    /// Research depth: basic, standard, comprehensive, expert
    #[arg(short, long, default_value = "standard")]
    depth: String,

    /// Subtopic to research (repeatable; discovered automatically if omitted)
    #[arg(short, long = "subtopic")]
    subtopics: Vec<String>,

    /// Include academic sources (arXiv)
    #[arg(long)]
    academic: bool,

    /// Include news sources
    #[arg(long)]
    news: bool,

    /// Workspace directory (for veritas.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Write the Markdown report to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit the full run state as JSON instead of a Markdown report
    #[arg(long)]
    json: bool,

    /// Run offline with canned search results and a stub generator
    #[arg(long)]
    offline: bool,

    /// Override the per-topic source budget
    #[arg(long)]
    max_sources: Option<usize>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

/// Prints stage progress to stderr as percentages.
struct ConsoleProgressSink;

impl ProgressSink for ConsoleProgressSink {
    fn on_progress(&self, stage: &str, progress: f64) {
        eprintln!("[{:>3.0}%] {stage}", progress * 100.0);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let mut config = veritas_core::load_config(Some(&cli.workspace))
        .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;
    if let Some(max_sources) = cli.max_sources {
        config.research.max_sources = max_sources;
    }

    let generator: Arc<dyn TextGenerator> = if cli.offline {
        Arc::new(MockGenerator::with_response(
            "Offline mode: no generation service available.",
        ))
    } else {
        Arc::new(
            OpenAiCompatibleGenerator::new(&config.generation)
                .map_err(|e| anyhow::anyhow!("Generator setup failed: {e}"))?,
        )
    };
    let providers = if cli.offline {
        SearchProviders::uniform(Arc::new(StaticSearchProvider::with_count(
            "offline",
            config.research.max_sources,
        )))
    } else {
        SearchProviders::live(config.research.search_timeout_secs)
    };

    let research_id = format!(
        "run-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
    );
    let request = ResearchRequest {
        research_id,
        main_topic: cli.topic.clone(),
        subtopics: cli.subtopics.iter().map(|s| Topic::new(s.as_str())).collect(),
        depth: DepthLevel::parse(&cli.depth),
        include_academic: cli.academic,
        include_news: cli.news,
    };

    let engine = ResearchEngine::new(generator, providers, &config);
    let state = if cli.quiet {
        engine.run(request, &NoOpProgressSink).await
    } else {
        engine.run(request, &ConsoleProgressSink).await
    };

    for error in &state.errors {
        tracing::warn!(error, "Run recorded a non-fatal error");
    }

    let output = if cli.json {
        serde_json::to_string_pretty(&state)?
    } else {
        let report = state
            .final_report
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Run produced no report"))?;
        render_markdown(report)
    };

    match &cli.output {
        Some(path) => {
            std::fs::write(path, &output)?;
            if !cli.quiet {
                eprintln!("Report written to {}", path.display());
            }
        }
        None => println!("{output}"),
    }
    Ok(())
}

fn render_markdown(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", report.title));
    if !report.summary.is_empty() {
        out.push_str(&format!("## Summary\n\n{}\n\n", report.summary));
    }
    for section in &report.sections {
        out.push_str(&format!("## {}\n\n{}\n\n", section.title, section.content));
    }
    if !report.conclusion.is_empty() {
        out.push_str(&format!("## Conclusion\n\n{}\n\n", report.conclusion));
    }
    if !report.references.is_empty() {
        out.push_str("## References\n\n");
        for reference in &report.references {
            out.push_str(&format!("- {reference}\n"));
        }
    }
    out
}
