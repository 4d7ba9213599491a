//! Score values produced by the metrics.
//!
//! Every value carries an explicit failure tag so a caller can tell a
//! genuinely low score from a substituted one without parsing strings.

use serde::{Deserialize, Serialize};

/// Neutral midpoint substituted for an unusable multi-guideline entry.
pub const MIDPOINT_SCORE: f64 = 5.0;

/// Top of the raw 0–10 scale used at the request layer.
pub const MAX_RAW_SCORE: f64 = 10.0;

/// Why a score is a substitute rather than a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The model call itself failed.
    CallFailed,
    /// The model returned empty text.
    EmptyResponse,
    /// The text was not JSON.
    ParseFailed,
    /// JSON that does not match the expected schema.
    SchemaViolation,
    /// The model omitted this guideline from a multi-guideline response.
    MissingResult,
}

impl FailureKind {
    /// Stable tag prefixed to diagnostic reasons.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::CallFailed => "[scoring-failed:call]",
            Self::EmptyResponse => "[scoring-failed:empty-response]",
            Self::ParseFailed => "[scoring-failed:parse]",
            Self::SchemaViolation => "[scoring-failed:schema]",
            Self::MissingResult => "[synthesized:missing-response]",
        }
    }

    /// Reason string combining the tag and a detail message.
    pub fn reason(&self, detail: &str) -> String {
        if detail.is_empty() {
            self.tag().to_string()
        } else {
            format!("{} {}", self.tag(), detail)
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CallFailed => "call_failed",
            Self::EmptyResponse => "empty_response",
            Self::ParseFailed => "parse_failed",
            Self::SchemaViolation => "schema_violation",
            Self::MissingResult => "missing_result",
        };
        f.write_str(name)
    }
}

/// Normalized result of one (instruction, text) evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Score in 0.0–1.0.
    pub score: f64,
    pub reasons: Vec<String>,
    /// Raw model text, when there was one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Error message from a failed call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when `score` is a substitute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ScoreResult {
    /// A successful measurement.
    pub fn measured(score: f64, reasons: Vec<String>, raw: Option<String>) -> Self {
        Self {
            score,
            reasons,
            raw,
            error: None,
            failure: None,
        }
    }

    /// A substituted value tagged with `kind`.
    pub fn fallback(
        kind: FailureKind,
        score: f64,
        detail: &str,
        raw: Option<String>,
        error: Option<String>,
    ) -> Self {
        Self {
            score,
            reasons: vec![kind.reason(detail)],
            raw,
            error,
            failure: Some(kind),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.failure.is_some()
    }
}

/// Per-guideline result on the raw 0–10 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidelineResult {
    pub title: String,
    /// Score in 0.0–10.0.
    pub score: f64,
    pub reasons: Vec<String>,
    /// `Some` for placeholders produced by fallback or reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesized: Option<FailureKind>,
}

impl GuidelineResult {
    /// Midpoint placeholder for `title`.
    pub fn placeholder(title: impl Into<String>, kind: FailureKind, detail: &str) -> Self {
        Self {
            title: title.into(),
            score: MIDPOINT_SCORE,
            reasons: vec![kind.reason(detail)],
            synthesized: Some(kind),
        }
    }

    /// Rescale to a [`ScoreResult`] on 0.0–1.0, carrying the failure tag.
    pub fn normalized(&self) -> ScoreResult {
        ScoreResult {
            score: self.score / MAX_RAW_SCORE,
            reasons: self.reasons.clone(),
            raw: None,
            error: None,
            failure: self.synthesized,
        }
    }
}

/// Results of a multi-guideline evaluation.
///
/// Titles are expected to be unique but this is not enforced: entries the
/// model returned are kept verbatim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MultiResult {
    pub results: Vec<GuidelineResult>,
}

impl MultiResult {
    /// First entry with the given title.
    pub fn get(&self, title: &str) -> Option<&GuidelineResult> {
        self.results.iter().find(|r| r.title == title)
    }

    /// Number of placeholder entries.
    pub fn synthesized_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.synthesized.is_some())
            .count()
    }

    /// A multi-guideline measurement has no single scalar score.
    pub fn outcome(self) -> Outcome {
        Outcome::SeeDetail(self)
    }
}

/// What a scalar-shaped slot actually holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A real score.
    Score(f64),
    /// Nothing contributed to this slot.
    NoSamples,
    /// Per-guideline results must be read instead.
    SeeDetail(MultiResult),
}

impl Outcome {
    /// The scalar, if there is one.
    pub fn score(&self) -> Option<f64> {
        match self {
            Outcome::Score(s) => Some(*s),
            _ => None,
        }
    }
}
