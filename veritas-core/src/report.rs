//! Report assembly: the final, always-structurally-complete document.
//!
//! The narrative parts come from one generation call over the synthesized
//! content; if that call fails or returns garbage, the report is built
//! directly from the topic syntheses instead. References are formatted
//! locally from source metadata and never depend on generation.

use crate::generation::TextGenerator;
use crate::payload::parse_payload;
use crate::types::{Report, ReportSection, SourceItem, SourceType, SynthesizedContent};
use serde::Deserialize;
use std::sync::Arc;

/// Sources below this reliability are kept in the data but not cited.
const CITATION_MIN_RELIABILITY: f64 = 0.6;

const REPORT_TEMPLATE: &str = "\
You are a research writer producing a final report.

Main Research Topic: {main_topic}

Overall Synthesis:
{overall_synthesis}

Main Themes: {main_themes}

Topic Syntheses:
{topic_syntheses}

Please write a structured research report of at most {max_words} words. Provide:
1. A descriptive report title
2. An executive summary (1-2 paragraphs)
3. One section per major topic or theme, each with a title and content
4. A conclusion
5. A references list in {citation_style} style

Your response should be in the following JSON format:
```json
{
  \"title\": \"Report Title\",
  \"summary\": \"Executive summary\",
  \"sections\": [
    {\"title\": \"Section Title\", \"content\": \"Section content\"}
  ],
  \"conclusion\": \"Concluding remarks\",
  \"references\": [\"Formatted reference 1\"]
}
```";

/// Citation format for the references list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CitationStyle {
    #[default]
    Apa,
    Mla,
}

impl CitationStyle {
    /// Loose parse with the APA fallback.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "mla" => CitationStyle::Mla,
            _ => CitationStyle::Apa,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CitationStyle::Apa => "APA",
            CitationStyle::Mla => "MLA",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReportPayload {
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    sections: Vec<ReportSection>,
    #[serde(default)]
    conclusion: String,
    #[serde(default)]
    references: Vec<String>,
}

/// Assembles the final report from synthesized content and sources.
pub struct ReportBuilder {
    generator: Arc<dyn TextGenerator>,
    citation_style: CitationStyle,
    max_report_words: usize,
}

impl ReportBuilder {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        citation_style: CitationStyle,
        max_report_words: usize,
    ) -> Self {
        Self {
            generator,
            citation_style,
            max_report_words,
        }
    }

    /// Build the report. Never fails; the worst case is a report with one
    /// placeholder section per subtopic and locally formatted references.
    ///
    /// Generated references are kept when the narrative supplies them;
    /// otherwise (and always in the fallback path) they are formatted
    /// deterministically from source metadata.
    pub async fn build(
        &self,
        main_topic: &str,
        subtopic_titles: &[String],
        content: &SynthesizedContent,
        sources: &[SourceItem],
    ) -> Report {
        let mut report = match self.generate_narrative(main_topic, content).await {
            Some(report) => report,
            None => fallback_report(main_topic, subtopic_titles, content),
        };
        if report.references.is_empty() {
            report.references = format_references(sources, self.citation_style);
        }
        report
    }

    async fn generate_narrative(
        &self,
        main_topic: &str,
        content: &SynthesizedContent,
    ) -> Option<Report> {
        let digest = content
            .topic_syntheses
            .iter()
            .map(|ts| format!("## {}\n{}", ts.topic, ts.synthesis))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = REPORT_TEMPLATE
            .replace("{main_topic}", main_topic)
            .replace("{overall_synthesis}", &content.overall_synthesis)
            .replace("{main_themes}", &content.main_themes.join(", "))
            .replace("{topic_syntheses}", &digest)
            .replace("{max_words}", &self.max_report_words.to_string())
            .replace("{citation_style}", self.citation_style.as_str());

        let text = self
            .generator
            .generate(&prompt)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Report generation call failed"))
            .ok()?;
        let payload = parse_payload::<ReportPayload>(&text)
            .inspect_err(|e| tracing::warn!(error = %e, "Report payload unparsable"))
            .ok()?;

        // An empty narrative is as useless as a failed call
        if payload.title.is_empty() && payload.sections.is_empty() {
            return None;
        }
        Some(Report {
            title: payload.title,
            summary: payload.summary,
            sections: payload.sections,
            conclusion: payload.conclusion,
            references: payload.references,
        })
    }
}

/// Report assembled directly from the synthesized content, used when the
/// narrative generation fails. With no syntheses either, every subtopic
/// still gets a placeholder section so the structure stays complete.
fn fallback_report(
    main_topic: &str,
    subtopic_titles: &[String],
    content: &SynthesizedContent,
) -> Report {
    let sections: Vec<ReportSection> = if content.topic_syntheses.is_empty() {
        subtopic_titles
            .iter()
            .map(|title| ReportSection {
                title: title.clone(),
                content: "Content unavailable.".to_string(),
            })
            .collect()
    } else {
        content
            .topic_syntheses
            .iter()
            .map(|ts| ReportSection {
                title: ts.topic.clone(),
                content: ts.synthesis.clone(),
            })
            .collect()
    };
    let summary = if content.overall_synthesis.is_empty() {
        format!("Report generation was unavailable for {main_topic}.")
    } else {
        content.overall_synthesis.clone()
    };
    Report {
        title: format!("Research Report: {main_topic}"),
        summary,
        sections,
        conclusion: String::new(),
        references: Vec::new(),
    }
}

/// Format the references list from sources above the citation bar,
/// deduplicated by URL, in source order.
fn format_references(sources: &[SourceItem], style: CitationStyle) -> Vec<String> {
    let mut seen_urls: Vec<&str> = Vec::new();
    let mut references = Vec::new();
    for source in sources {
        if source.reliability_score < CITATION_MIN_RELIABILITY {
            continue;
        }
        if source.url.is_empty() || seen_urls.contains(&source.url.as_str()) {
            continue;
        }
        seen_urls.push(&source.url);
        references.push(format_citation(source, style));
    }
    references
}

fn format_citation(source: &SourceItem, style: CitationStyle) -> String {
    // Wikipedia entries carry a fixed attribution; academic and web
    // sources cite their metadata, falling back to the site domain
    let authors = if source.source_type == SourceType::Wikipedia {
        "Wikipedia".to_string()
    } else {
        source
            .metadata
            .get("authors")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| domain_of(&source.url))
    };
    let year = source
        .metadata
        .get("year")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("n.d.");
    let journal = source
        .metadata
        .get("journal")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    match style {
        CitationStyle::Apa => {
            let venue = if journal.is_empty() {
                String::new()
            } else {
                format!(" {journal}.")
            };
            format!(
                "{authors} ({year}). {}.{venue} Retrieved from {}",
                source.title, source.url
            )
        }
        CitationStyle::Mla => {
            let venue = if journal.is_empty() {
                String::new()
            } else {
                format!(" {journal},")
            };
            format!(
                "{authors}. \"{}.\"{venue} {year}, {}.",
                source.title, source.url
            )
        }
    }
}

/// Host part of a URL, used as the citation author of record when the
/// source carries no author metadata.
fn domain_of(url: &str) -> String {
    url.split("//")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or(url)
        .trim_start_matches("www.")
        .to_string()
}
