//! Compliance metrics.
//!
//! - [`ComplianceMetric`] scores one instruction against one text per call
//!   and returns a normalized [`ScoreResult`].
//! - [`MultiGuidelineComplianceMetric`] scores a whole guideline set in one
//!   call and returns a [`MultiResult`] on the raw 0–10 scale.
//!
//! Neither metric ever returns an error. Call failures and malformed
//! responses become tagged substitute values (see [`crate::validate`]).

use std::sync::Arc;

use async_trait::async_trait;
use replyguide_llm::ChatModel;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::guideline::Guideline;
use crate::metrics::METRICS;
use crate::obs::emit_measurement_fallback;
use crate::request::{build_multi_request, build_single_request};
use crate::score::{FailureKind, MultiResult, ScoreResult, MAX_RAW_SCORE};
use crate::validate::{decode_multi, decode_single, fallback_multi, fallback_single};

/// Output token cap for single-instruction calls.
pub const DEFAULT_SINGLE_MAX_TOKENS: u32 = 200;

/// Output token cap for multi-guideline calls.
pub const DEFAULT_MULTI_MAX_TOKENS: u32 = 1000;

/// Texts shorter than this are scored with a low-confidence warning.
pub const MIN_RELIABLE_TEXT_CHARS: usize = 10;

/// Title used when a bare instruction is wrapped into a guideline.
pub const SINGLE_INSTRUCTION_TITLE: &str = "instruction";

/// How many guidelines a scorer covers per model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScoreBatching {
    /// One call per guideline.
    #[serde(rename = "single")]
    PerGuideline,
    /// One call covering every guideline.
    #[default]
    #[serde(rename = "multi")]
    AllGuidelines,
}

impl std::fmt::Display for ScoreBatching {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreBatching::PerGuideline => f.write_str("single"),
            ScoreBatching::AllGuidelines => f.write_str("multi"),
        }
    }
}

/// Scores a text against guidelines; the seam the batch evaluator drives.
#[async_trait]
pub trait GuidelineScorer: Send + Sync {
    fn batching(&self) -> ScoreBatching;

    /// One normalized result per guideline, in `guidelines` order.
    async fn score(&self, guidelines: &[Guideline], text: &str) -> Vec<ScoreResult>;
}

/// Build the scorer for `batching` on top of `model`.
pub fn scorer_for(
    batching: ScoreBatching,
    model: Arc<dyn ChatModel>,
    max_tokens: Option<u32>,
) -> Arc<dyn GuidelineScorer> {
    match batching {
        ScoreBatching::PerGuideline => {
            let metric = ComplianceMetric::new(model);
            Arc::new(match max_tokens {
                Some(n) => metric.with_max_tokens(n),
                None => metric,
            })
        }
        ScoreBatching::AllGuidelines => {
            let metric = MultiGuidelineComplianceMetric::new(model);
            Arc::new(match max_tokens {
                Some(n) => metric.with_max_tokens(n),
                None => metric,
            })
        }
    }
}

fn warn_if_short(text: &str) {
    let chars = text.chars().count();
    if chars < MIN_RELIABLE_TEXT_CHARS {
        warn!(
            chars,
            min = MIN_RELIABLE_TEXT_CHARS,
            "text is very short; guideline compliance judgement may be unreliable"
        );
    }
}

/// Single-instruction compliance metric.
pub struct ComplianceMetric {
    model: Arc<dyn ChatModel>,
    max_tokens: u32,
}

impl ComplianceMetric {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            max_tokens: DEFAULT_SINGLE_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Score `text` against `instruction`, normalized to 0.0–1.0.
    ///
    /// Failures yield score 0 with `failure` set; this never errors.
    pub async fn measure(&self, instruction: &str, text: &str) -> ScoreResult {
        let request = build_single_request(instruction, text, self.max_tokens);
        METRICS.inc_model_calls();

        let raw = match self.model.complete(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                let message = e.to_string();
                emit_measurement_fallback(FailureKind::CallFailed, &message);
                METRICS.inc_fallbacks();
                return fallback_single(
                    FailureKind::CallFailed,
                    &message,
                    None,
                    Some(message.clone()),
                );
            }
        };

        match decode_single(&raw) {
            Ok(decoded) => {
                debug!(score = decoded.score, "instruction scored");
                ScoreResult::measured(decoded.score / MAX_RAW_SCORE, decoded.reasons, Some(raw))
            }
            Err(e) => {
                emit_measurement_fallback(e.kind, &e.detail);
                METRICS.inc_fallbacks();
                fallback_single(e.kind, &e.detail, Some(e.raw), None)
            }
        }
    }
}

#[async_trait]
impl GuidelineScorer for ComplianceMetric {
    fn batching(&self) -> ScoreBatching {
        ScoreBatching::PerGuideline
    }

    async fn score(&self, guidelines: &[Guideline], text: &str) -> Vec<ScoreResult> {
        let mut out = Vec::with_capacity(guidelines.len());
        for g in guidelines {
            out.push(self.measure(&g.instruction, text).await);
        }
        out
    }
}

/// Multi-guideline compliance metric.
pub struct MultiGuidelineComplianceMetric {
    model: Arc<dyn ChatModel>,
    max_tokens: u32,
}

impl MultiGuidelineComplianceMetric {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            max_tokens: DEFAULT_MULTI_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Score `text` against every guideline in one call.
    ///
    /// Scores stay on the 0–10 scale. Call failure, empty text or a bad
    /// shape give every guideline the midpoint; a partial response is
    /// reconciled. The result has no scalar score: its
    /// [`outcome`](MultiResult::outcome) is `SeeDetail`.
    pub async fn measure_all(&self, guidelines: &[Guideline], text: &str) -> MultiResult {
        warn_if_short(text);
        if guidelines.is_empty() {
            return MultiResult::default();
        }

        let request = build_multi_request(guidelines, text, self.max_tokens);
        METRICS.inc_model_calls();

        let raw = match self.model.complete(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                let message = e.to_string();
                emit_measurement_fallback(FailureKind::CallFailed, &message);
                METRICS.inc_fallbacks();
                return fallback_multi(guidelines, FailureKind::CallFailed, &message);
            }
        };

        match decode_multi(&raw, guidelines) {
            Ok(multi) => {
                METRICS.add_synthesized(multi.synthesized_count() as u64);
                multi
            }
            Err(e) => {
                emit_measurement_fallback(e.kind, &e.detail);
                METRICS.inc_fallbacks();
                fallback_multi(guidelines, e.kind, &e.detail)
            }
        }
    }

    /// Score one instruction, normalized to 0.0–1.0.
    ///
    /// Wraps the instruction into a one-guideline set and rescales the
    /// first result; a substituted midpoint keeps its failure tag.
    pub async fn measure(&self, instruction: &str, text: &str) -> ScoreResult {
        let guidelines = [Guideline::new(SINGLE_INSTRUCTION_TITLE, instruction)];
        let multi = self.measure_all(&guidelines, text).await;

        multi
            .get(SINGLE_INSTRUCTION_TITLE)
            .or_else(|| multi.results.first())
            .map(|r| r.normalized())
            .unwrap_or_else(|| {
                fallback_single(FailureKind::MissingResult, "no result returned", None, None)
            })
    }
}

#[async_trait]
impl GuidelineScorer for MultiGuidelineComplianceMetric {
    fn batching(&self) -> ScoreBatching {
        ScoreBatching::AllGuidelines
    }

    async fn score(&self, guidelines: &[Guideline], text: &str) -> Vec<ScoreResult> {
        let multi = self.measure_all(guidelines, text).await;
        guidelines
            .iter()
            .map(|g| match multi.get(&g.title) {
                Some(r) => r.normalized(),
                None => fallback_single(
                    FailureKind::MissingResult,
                    "no result returned",
                    None,
                    None,
                ),
            })
            .collect()
    }
}
