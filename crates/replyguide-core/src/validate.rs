//! Response validation.
//!
//! Raw model text is decoded strictly against one of the two schemas built
//! in [`crate::request`]. Decoding yields either a typed value or a
//! [`DecodeError`] carrying the raw payload; what to substitute on failure
//! is decided by the `fallback_*` helpers, called from the metrics.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

use crate::guideline::Guideline;
use crate::score::{FailureKind, GuidelineResult, MultiResult, ScoreResult, MAX_RAW_SCORE};

/// A response that does not decode to the expected schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct DecodeError {
    pub kind: FailureKind,
    pub detail: String,
    pub raw: String,
}

impl DecodeError {
    fn new(kind: FailureKind, detail: impl Into<String>, raw: &str) -> Self {
        Self {
            kind,
            detail: detail.into(),
            raw: raw.to_string(),
        }
    }
}

/// A decoded single-instruction response, raw 0–10 scale.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleScore {
    pub score: f64,
    pub reasons: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SingleWire {
    score: f64,
    reasons: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MultiWire {
    results: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ItemWire {
    title: String,
    score: f64,
    reasons: Vec<String>,
}

fn check_score(score: f64) -> Result<f64, String> {
    if score.is_finite() && (0.0..=MAX_RAW_SCORE).contains(&score) {
        Ok(score)
    } else {
        Err(format!("score {score} outside 0-10"))
    }
}

fn parse_json(raw: &str) -> Result<Value, DecodeError> {
    if raw.trim().is_empty() {
        return Err(DecodeError::new(
            FailureKind::EmptyResponse,
            "model returned empty text",
            raw,
        ));
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| DecodeError::new(FailureKind::ParseFailed, e.to_string(), raw))?;
    if !value.is_object() {
        return Err(DecodeError::new(
            FailureKind::SchemaViolation,
            "expected a JSON object",
            raw,
        ));
    }
    Ok(value)
}

/// Decode `{score, reasons}`.
pub fn decode_single(raw: &str) -> Result<SingleScore, DecodeError> {
    let value = parse_json(raw)?;
    let wire: SingleWire = serde_json::from_value(value)
        .map_err(|e| DecodeError::new(FailureKind::SchemaViolation, e.to_string(), raw))?;
    let score = check_score(wire.score)
        .map_err(|d| DecodeError::new(FailureKind::SchemaViolation, d, raw))?;

    Ok(SingleScore {
        score,
        reasons: wire.reasons,
    })
}

/// Decode `{results: [...]}` and reconcile it against `guidelines`.
///
/// A missing, non-array or empty `results` fails the whole response.
/// Individual items are checked on their own: an invalid item with a string
/// title becomes a midpoint placeholder in place, an invalid item without
/// one is dropped. Requested titles still absent afterwards are appended by
/// [`reconcile`].
pub fn decode_multi(raw: &str, guidelines: &[Guideline]) -> Result<MultiResult, DecodeError> {
    let value = parse_json(raw)?;
    let wire: MultiWire = serde_json::from_value(value)
        .map_err(|e| DecodeError::new(FailureKind::SchemaViolation, e.to_string(), raw))?;

    if wire.results.is_empty() {
        return Err(DecodeError::new(
            FailureKind::SchemaViolation,
            "results is empty",
            raw,
        ));
    }

    let mut results = Vec::with_capacity(guidelines.len());
    for (index, item) in wire.results.into_iter().enumerate() {
        match decode_item(&item) {
            Ok(result) => results.push(result),
            Err(detail) => match item.get("title").and_then(Value::as_str) {
                Some(title) if !title.is_empty() => {
                    warn!(title = %title, detail = %detail, "invalid guideline result replaced");
                    results.push(GuidelineResult::placeholder(
                        title,
                        FailureKind::SchemaViolation,
                        &detail,
                    ));
                }
                _ => {
                    warn!(index, detail = %detail, "untitled guideline result dropped");
                }
            },
        }
    }

    Ok(reconcile(MultiResult { results }, guidelines))
}

fn decode_item(item: &Value) -> Result<GuidelineResult, String> {
    let wire: ItemWire = serde_json::from_value(item.clone()).map_err(|e| e.to_string())?;
    let score = check_score(wire.score)?;
    Ok(GuidelineResult {
        title: wire.title,
        score,
        reasons: wire.reasons,
        synthesized: None,
    })
}

/// Append a midpoint placeholder for every requested title not present.
///
/// Placeholders go at the end, so the output follows the model's order
/// first and the declaration order only for the appended entries.
pub fn reconcile(mut multi: MultiResult, guidelines: &[Guideline]) -> MultiResult {
    let present: HashSet<String> = multi.results.iter().map(|r| r.title.clone()).collect();

    let missing: Vec<&Guideline> = guidelines
        .iter()
        .filter(|g| !present.contains(&g.title))
        .collect();

    if !missing.is_empty() {
        warn!(
            missing = missing.len(),
            requested = guidelines.len(),
            "model response omitted guidelines; synthesizing placeholders"
        );
    }

    for g in missing {
        multi.results.push(GuidelineResult::placeholder(
            g.title.clone(),
            FailureKind::MissingResult,
            "model response did not cover this guideline",
        ));
    }

    multi
}

/// Substitute for a failed single-instruction measurement: score 0.
pub fn fallback_single(
    kind: FailureKind,
    detail: &str,
    raw: Option<String>,
    error: Option<String>,
) -> ScoreResult {
    ScoreResult::fallback(kind, 0.0, detail, raw, error)
}

/// Substitute for a failed multi-guideline measurement: midpoint for all.
pub fn fallback_multi(guidelines: &[Guideline], kind: FailureKind, detail: &str) -> MultiResult {
    MultiResult {
        results: guidelines
            .iter()
            .map(|g| GuidelineResult::placeholder(g.title.clone(), kind, detail))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::MIDPOINT_SCORE;

    fn guidelines() -> Vec<Guideline> {
        vec![
            Guideline::new("Greeting", "Thank the reviewer."),
            Guideline::new("Apology", "Apologize for problems."),
            Guideline::new("Signature", "Sign as The Team."),
        ]
    }

    #[test]
    fn test_decode_single_accepts_valid_payload() {
        let s = decode_single(r#"{"score": 7, "reasons": ["polite", "short"]}"#).unwrap();
        assert_eq!(s.score, 7.0);
        assert_eq!(s.reasons, vec!["polite", "short"]);
    }

    #[test]
    fn test_decode_single_classifies_failures() {
        let cases = [
            ("", FailureKind::EmptyResponse),
            ("   \n", FailureKind::EmptyResponse),
            ("not json", FailureKind::ParseFailed),
            (r#"{"score": 7}"#, FailureKind::SchemaViolation),
            (r#"{"score": 11, "reasons": []}"#, FailureKind::SchemaViolation),
            (r#"{"score": -1, "reasons": []}"#, FailureKind::SchemaViolation),
            (r#"{"score": "7", "reasons": []}"#, FailureKind::SchemaViolation),
            (r#"{"score": 7, "reasons": [1, 2]}"#, FailureKind::SchemaViolation),
            (r#"{"score": 7, "reasons": [], "extra": true}"#, FailureKind::SchemaViolation),
            (r#"[7]"#, FailureKind::SchemaViolation),
        ];

        for (raw, kind) in cases {
            let err = decode_single(raw).unwrap_err();
            assert_eq!(err.kind, kind, "raw: {raw:?}");
            assert_eq!(err.raw, raw);
        }
    }

    #[test]
    fn test_decode_single_accepts_bounds() {
        assert_eq!(decode_single(r#"{"score":0,"reasons":[]}"#).unwrap().score, 0.0);
        assert_eq!(decode_single(r#"{"score":10,"reasons":[]}"#).unwrap().score, 10.0);
    }

    #[test]
    fn test_decode_multi_complete_passes_through() {
        let raw = r#"{"results":[
            {"title":"Signature","score":9,"reasons":["signed"]},
            {"title":"Greeting","score":4,"reasons":["no thanks"]},
            {"title":"Apology","score":10,"reasons":[]}
        ]}"#;
        let multi = decode_multi(raw, &guidelines()).unwrap();

        let titles: Vec<_> = multi.results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Signature", "Greeting", "Apology"]);
        assert_eq!(multi.get("Greeting").unwrap().score, 4.0);
        assert_eq!(multi.synthesized_count(), 0);
    }

    #[test]
    fn test_decode_multi_appends_missing_titles() {
        let raw = r#"{"results":[{"title":"Signature","score":8,"reasons":["ok"]}]}"#;
        let multi = decode_multi(raw, &guidelines()).unwrap();

        let titles: Vec<_> = multi.results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Signature", "Greeting", "Apology"]);
        let greeting = multi.get("Greeting").unwrap();
        assert_eq!(greeting.score, MIDPOINT_SCORE);
        assert_eq!(greeting.synthesized, Some(FailureKind::MissingResult));
        assert!(greeting.reasons[0].starts_with(FailureKind::MissingResult.tag()));
    }

    #[test]
    fn test_decode_multi_replaces_invalid_item_in_place() {
        let raw = r#"{"results":[
            {"title":"Greeting","score":42,"reasons":[]},
            {"title":"Apology","score":6,"reasons":["ok"]},
            {"score":3,"reasons":[]}
        ]}"#;
        let multi = decode_multi(raw, &guidelines()).unwrap();

        assert_eq!(multi.results.len(), 3);
        assert_eq!(multi.results[0].title, "Greeting");
        assert_eq!(multi.results[0].synthesized, Some(FailureKind::SchemaViolation));
        assert_eq!(multi.results[1].score, 6.0);
        assert_eq!(multi.results[2].title, "Signature");
        assert_eq!(multi.results[2].synthesized, Some(FailureKind::MissingResult));
    }

    #[test]
    fn test_decode_multi_fatal_shapes() {
        for raw in [
            r#"{"results": []}"#,
            r#"{"results": "none"}"#,
            r#"{"items": []}"#,
            r#"{"results": [], "note": 1}"#,
            r#"42"#,
        ] {
            let err = decode_multi(raw, &guidelines()).unwrap_err();
            assert_eq!(err.kind, FailureKind::SchemaViolation, "raw: {raw}");
        }
        assert_eq!(
            decode_multi("{", &guidelines()).unwrap_err().kind,
            FailureKind::ParseFailed
        );
        assert_eq!(
            decode_multi("", &guidelines()).unwrap_err().kind,
            FailureKind::EmptyResponse
        );
    }

    #[test]
    fn test_reconcile_completeness_for_every_prefix() {
        let all = guidelines();
        for k in 0..=all.len() {
            let partial = MultiResult {
                results: all[..k]
                    .iter()
                    .map(|g| GuidelineResult {
                        title: g.title.clone(),
                        score: 7.0,
                        reasons: vec![],
                        synthesized: None,
                    })
                    .collect(),
            };
            let multi = reconcile(partial, &all);
            assert_eq!(multi.results.len(), all.len());
            for g in &all {
                assert_eq!(
                    multi.results.iter().filter(|r| r.title == g.title).count(),
                    1
                );
            }
            assert_eq!(multi.synthesized_count(), all.len() - k);
        }
    }

    #[test]
    fn test_fallbacks() {
        let single = fallback_single(
            FailureKind::ParseFailed,
            "bad json",
            Some("{".to_string()),
            None,
        );
        assert_eq!(single.score, 0.0);
        assert_eq!(single.raw.as_deref(), Some("{"));
        assert_eq!(single.failure, Some(FailureKind::ParseFailed));

        let multi = fallback_multi(&guidelines(), FailureKind::CallFailed, "timeout");
        assert_eq!(multi.results.len(), 3);
        assert!(multi
            .results
            .iter()
            .all(|r| r.score == MIDPOINT_SCORE && r.synthesized == Some(FailureKind::CallFailed)));
    }
}
