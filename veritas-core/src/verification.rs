//! Source verification: per-item reliability scoring, then pairwise
//! cross-verification of the strongest same-topic items.
//!
//! Phase A scores every item independently on a bounded pool; a failed
//! scoring call degrades that one item to a neutral assessment. Phase B
//! compares the top two items of each topic and nudges their scores
//! toward the more reliable one. Neither phase returns an error.

use crate::generation::TextGenerator;
use crate::payload::truncate_chars;
use crate::types::{CrossVerification, SourceAssessment, SourceItem};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Content budget for the scoring prompt when extraction failed upstream.
const SCORING_FALLBACK_CHARS: usize = 2000;
/// Per-side content budget for the cross-verification prompt.
const CROSS_VERIFY_SIDE_CHARS: usize = 1000;
/// Reliability multiplier for the more reliable item of a verified pair.
const BOOST_FACTOR: f64 = 1.1;
/// Reliability multiplier for the less reliable item of a verified pair.
const PENALTY_FACTOR: f64 = 0.9;
/// Adjusted scores never leave [0.1, 1.0].
const SCORE_FLOOR: f64 = 0.1;

const SOURCE_VERIFICATION_TEMPLATE: &str = "\
You are a critical research analyst evaluating the reliability of a source.

Source Title: {title}
Source URL: {url}
Source Type: {source_type}
Content:
{content}

Please evaluate this source on the following dimensions, each scored from 0.0 \
(worst) to 1.0 (best):
1. consistency_score: Is the content internally consistent?
2. credibility_score: Does the source appear credible and authoritative?
3. accuracy_score: Does the content appear factually accurate?
4. bias_score: Is the content free from obvious bias? (1.0 = unbiased)
5. completeness_score: Does the content cover its subject adequately?

Also provide an overall_score (0.0-1.0) reflecting overall reliability, a list \
of issues_identified, and brief verification_notes.

Your response should be in the following JSON format:
```json
{
  \"consistency_score\": 0.8,
  \"credibility_score\": 0.7,
  \"accuracy_score\": 0.8,
  \"bias_score\": 0.9,
  \"completeness_score\": 0.6,
  \"overall_score\": 0.75,
  \"issues_identified\": [\"Issue 1\"],
  \"verification_notes\": \"Brief notes on the evaluation\"
}
```";

const CROSS_VERIFICATION_TEMPLATE: &str = "\
You are a research analyst comparing two sources covering the same topic.

Topic: {topic}

Source 1: {title1}
Content:
{content1}

Source 2: {title2}
Content:
{content2}

Please compare these sources and identify:
1. Points where the sources agree
2. Points where the sources disagree or contradict each other
3. Information unique to source 1
4. Information unique to source 2
5. Which source appears more reliable overall (\"source1\" or \"source2\")

Your response should be in the following JSON format:
```json
{
  \"agreements\": [\"Agreement 1\"],
  \"disagreements\": [\"Disagreement 1\"],
  \"unique_source1\": [\"Unique point 1\"],
  \"unique_source2\": [\"Unique point 1\"],
  \"more_reliable_source\": \"source1\",
  \"cross_verification_notes\": \"Brief comparison notes\"
}
```";

/// Scores collected items and filters them by reliability threshold.
pub struct SourceVerifier {
    generator: Arc<dyn TextGenerator>,
    worker_width: usize,
}

impl SourceVerifier {
    pub fn new(generator: Arc<dyn TextGenerator>, worker_width: usize) -> Self {
        Self {
            generator,
            worker_width: worker_width.max(1),
        }
    }

    /// Run both verification phases over the collected items.
    ///
    /// `progress` receives the stage-internal fraction in [0, 1]: phase A
    /// advances it to 0.7 as items complete, phase B takes it to 1.0.
    /// The returned vector preserves the input order.
    pub async fn verify(
        &self,
        items: Vec<SourceItem>,
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Vec<SourceItem> {
        let total = items.len();
        if total == 0 {
            progress(1.0);
            return items;
        }

        let mut scored = self.score_all(items, progress).await;
        self.cross_verify(&mut scored).await;
        progress(1.0);
        scored
    }

    /// Phase A: score every item concurrently, placing results back at
    /// their original index so the output order matches the input.
    async fn score_all(
        &self,
        items: Vec<SourceItem>,
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Vec<SourceItem> {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.worker_width));
        let mut tasks: JoinSet<(usize, SourceItem)> = JoinSet::new();

        for (index, mut item) in items.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let generator = self.generator.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let assessment = score_item(&*generator, &item).await;
                item.reliability_score = assessment.overall_score;
                item.assessment = Some(assessment);
                (index, item)
            });
        }

        let mut slots: Vec<Option<SourceItem>> = (0..total).map(|_| None).collect();
        let mut done = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, item)) => {
                    slots[index] = Some(item);
                    done += 1;
                    progress((done as f64 / total as f64).min(0.7));
                }
                Err(e) => tracing::error!(error = %e, "Verification task panicked"),
            }
        }
        slots.into_iter().flatten().collect()
    }

    /// Phase B: for every topic with at least two items, compare the two
    /// most reliable ones and adjust their scores toward the winner.
    async fn cross_verify(&self, items: &mut [SourceItem]) {
        for (first, second) in top_pairs(items) {
            let record = match self.compare_pair(&items[first], &items[second]).await {
                Some(record) => record,
                None => continue,
            };

            // Ties and unrecognized answers leave scores untouched.
            let winner = if record.more_reliable_source.contains('1') {
                Some((first, second))
            } else if record.more_reliable_source.contains('2') {
                Some((second, first))
            } else {
                None
            };
            if let Some((boosted, penalized)) = winner {
                items[boosted].reliability_score =
                    (items[boosted].reliability_score * BOOST_FACTOR).min(1.0);
                items[penalized].reliability_score =
                    (items[penalized].reliability_score * PENALTY_FACTOR).max(SCORE_FLOOR);
            }

            items[first].cross_verification = Some(record.clone());
            items[second].cross_verification = Some(record);
        }
    }

    async fn compare_pair(
        &self,
        source1: &SourceItem,
        source2: &SourceItem,
    ) -> Option<CrossVerification> {
        let prompt = CROSS_VERIFICATION_TEMPLATE
            .replace("{topic}", &source1.topic)
            .replace("{title1}", &source1.title)
            .replace(
                "{content1}",
                truncate_chars(&source1.extracted_content, CROSS_VERIFY_SIDE_CHARS),
            )
            .replace("{title2}", &source2.title)
            .replace(
                "{content2}",
                truncate_chars(&source2.extracted_content, CROSS_VERIFY_SIDE_CHARS),
            );

        let text = self
            .generator
            .generate(&prompt)
            .await
            .inspect_err(|e| {
                tracing::warn!(topic = %source1.topic, error = %e, "Cross-verification call failed");
            })
            .ok()?;
        crate::payload::parse_payload::<CrossVerification>(&text)
            .inspect_err(|e| {
                tracing::warn!(topic = %source1.topic, error = %e, "Cross-verification payload unparsable");
            })
            .ok()
    }
}

/// Score one item; a failed call or unparsable payload yields the neutral
/// assessment instead of an error.
async fn score_item(generator: &dyn TextGenerator, item: &SourceItem) -> SourceAssessment {
    let content = if item.extracted_content.is_empty()
        || item.extracted_content == "Error extracting content."
    {
        truncate_chars(&item.raw_content, SCORING_FALLBACK_CHARS)
    } else {
        &item.extracted_content
    };

    let prompt = SOURCE_VERIFICATION_TEMPLATE
        .replace("{title}", &item.title)
        .replace("{url}", &item.url)
        .replace("{source_type}", item.source_type.as_str())
        .replace("{content}", content);

    let text = match generator.generate(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(title = %item.title, error = %e, "Source scoring call failed");
            return SourceAssessment::neutral(format!("Scoring failed: {e}"));
        }
    };
    match crate::payload::parse_payload::<SourceAssessment>(&text) {
        Ok(assessment) => assessment.clamped(),
        Err(e) => {
            tracing::warn!(title = %item.title, error = %e, "Source assessment unparsable");
            SourceAssessment::neutral(format!("Assessment payload unparsable: {e}"))
        }
    }
}

/// Indices of the two most reliable items per topic, for every topic
/// holding at least two items. Topics are visited in first-appearance
/// order; within a topic, ties keep the earlier item first.
fn top_pairs(items: &[SourceItem]) -> Vec<(usize, usize)> {
    let mut topics: Vec<&str> = Vec::new();
    for item in items {
        if !topics.contains(&item.topic.as_str()) {
            topics.push(&item.topic);
        }
    }

    let mut pairs = Vec::new();
    for topic in topics {
        let mut indices: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.topic == topic)
            .map(|(i, _)| i)
            .collect();
        if indices.len() < 2 {
            continue;
        }
        // Stable sort keeps input order among equal scores
        indices.sort_by(|&a, &b| {
            items[b]
                .reliability_score
                .partial_cmp(&items[a].reliability_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        pairs.push((indices[0], indices[1]));
    }
    pairs
}

/// Keep only items at or above the reliability threshold, preserving order.
pub fn filter_by_threshold(items: Vec<SourceItem>, threshold: f64) -> Vec<SourceItem> {
    let before = items.len();
    let kept: Vec<SourceItem> = items
        .into_iter()
        .filter(|item| item.reliability_score >= threshold)
        .collect();
    tracing::info!(
        kept = kept.len(),
        dropped = before - kept.len(),
        threshold,
        "Filtered sources by reliability"
    );
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::MockGenerator;
    use crate::types::SourceType;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn item(title: &str, topic: &str, score: f64) -> SourceItem {
        SourceItem {
            title: title.to_string(),
            url: format!("https://example.com/{title}"),
            source_type: SourceType::Web,
            query: "q".to_string(),
            topic: topic.to_string(),
            parent_topic: "parent".to_string(),
            extracted_content: format!("content of {title}"),
            raw_content: String::new(),
            metadata: serde_json::Value::Null,
            collected_at: Utc::now(),
            reliability_score: score,
            assessment: None,
            cross_verification: None,
        }
    }

    fn assessment_json(overall: f64) -> String {
        format!(
            r#"```json
{{"consistency_score": 0.8, "credibility_score": 0.7, "accuracy_score": 0.8,
  "bias_score": 0.9, "completeness_score": 0.6, "overall_score": {overall},
  "issues_identified": [], "verification_notes": "ok"}}
```"#
        )
    }

    #[tokio::test]
    async fn test_scoring_sets_reliability() {
        let generator = Arc::new(MockGenerator::with_response(assessment_json(0.75)));
        let verifier = SourceVerifier::new(generator, 4);
        let items = vec![item("a", "T", 0.0)];
        let verified = verifier.verify(items, &|_| {}).await;
        assert_eq!(verified[0].reliability_score, 0.75);
        assert!(verified[0].assessment.is_some());
    }

    #[tokio::test]
    async fn test_scoring_failure_degrades_to_neutral() {
        let verifier = SourceVerifier::new(Arc::new(MockGenerator::failing()), 4);
        let verified = verifier.verify(vec![item("a", "T", 0.0)], &|_| {}).await;
        assert_eq!(verified[0].reliability_score, 0.5);
        let assessment = verified[0].assessment.as_ref().unwrap();
        assert_eq!(
            assessment.issues_identified,
            vec!["Verification process failed".to_string()]
        );
    }

    #[tokio::test]
    async fn test_output_preserves_input_order() {
        let generator = Arc::new(MockGenerator::with_response(assessment_json(0.8)));
        let verifier = SourceVerifier::new(generator, 4);
        let items = vec![item("a", "T1", 0.0), item("b", "T2", 0.0), item("c", "T3", 0.0)];
        let verified = verifier.verify(items, &|_| {}).await;
        let titles: Vec<&str> = verified.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_top_pairs_selects_strongest_two_per_topic() {
        let items = vec![
            item("a", "T1", 0.6),
            item("b", "T1", 0.9),
            item("c", "T1", 0.8),
            item("d", "T2", 0.7),
        ];
        // T2 has one item only, so no pair for it
        assert_eq!(top_pairs(&items), vec![(1, 2)]);
    }

    #[test]
    fn test_top_pairs_tie_keeps_earlier_first() {
        let items = vec![item("a", "T", 0.8), item("b", "T", 0.8)];
        assert_eq!(top_pairs(&items), vec![(0, 1)]);
    }

    #[tokio::test]
    async fn test_cross_verify_adjusts_scores() {
        let cross = r#"```json
{"agreements": ["both say X"], "disagreements": [],
 "unique_source1": [], "unique_source2": [],
 "more_reliable_source": "source1", "cross_verification_notes": "n"}
```"#;
        let generator = Arc::new(MockGenerator::with_response(cross));
        let verifier = SourceVerifier::new(generator, 4);
        let mut items = vec![item("a", "T", 0.8), item("b", "T", 0.6)];
        verifier.cross_verify(&mut items).await;

        assert!((items[0].reliability_score - 0.88).abs() < 1e-9);
        assert!((items[1].reliability_score - 0.54).abs() < 1e-9);
        assert!(items[0].cross_verification.is_some());
        assert!(items[1].cross_verification.is_some());
    }

    #[tokio::test]
    async fn test_cross_verify_boost_is_capped_and_penalty_floored() {
        let cross = r#"{"more_reliable_source": "source2"}"#;
        let generator = Arc::new(MockGenerator::with_response(cross));
        let verifier = SourceVerifier::new(generator, 4);
        let mut items = vec![item("a", "T", 0.1), item("b", "T", 0.99)];
        verifier.cross_verify(&mut items).await;

        // b was already ranked first, so it is "source1" positionally; the
        // model picked source2 which is a, boosting the weaker item
        assert!((items[0].reliability_score - 0.11).abs() < 1e-9);
        assert!((items[1].reliability_score - 0.891).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cross_verify_failure_leaves_scores_untouched() {
        let verifier = SourceVerifier::new(Arc::new(MockGenerator::failing()), 4);
        let mut items = vec![item("a", "T", 0.8), item("b", "T", 0.6)];
        verifier.cross_verify(&mut items).await;
        assert_eq!(items[0].reliability_score, 0.8);
        assert_eq!(items[1].reliability_score, 0.6);
        assert!(items[0].cross_verification.is_none());
    }

    #[test]
    fn test_filter_is_monotonic_in_threshold() {
        let items = vec![item("a", "T", 0.9), item("b", "T", 0.7), item("c", "T", 0.5)];
        let low = filter_by_threshold(items.clone(), 0.5);
        let high = filter_by_threshold(items, 0.8);
        assert!(high.len() <= low.len());
        assert!(high.iter().all(|h| low.iter().any(|l| l.title == h.title)));
    }

    #[test]
    fn test_filter_by_threshold() {
        let items = vec![item("a", "T", 0.9), item("b", "T", 0.69), item("c", "T", 0.7)];
        let kept = filter_by_threshold(items, 0.7);
        let titles: Vec<&str> = kept.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_progress_reaches_one() {
        let generator = Arc::new(MockGenerator::with_response(assessment_json(0.8)));
        let verifier = SourceVerifier::new(generator, 2);
        let last = std::sync::Mutex::new(0.0f64);
        let items = vec![item("a", "T", 0.0), item("b", "T", 0.0)];
        verifier
            .verify(items, &|p| {
                *last.lock().unwrap() = p;
            })
            .await;
        assert_eq!(*last.lock().unwrap(), 1.0);
    }
}
