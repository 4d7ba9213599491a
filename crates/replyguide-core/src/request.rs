//! Scoring request construction.
//!
//! Builds a system + user message pair and a JSON-schema output mode.
//! Content is passed through verbatim between separator lines; nothing is
//! truncated or escaped. The requested scale is always integers 0–10;
//! normalization happens in the metric layer.

use replyguide_llm::{ChatMessage, CompletionRequest, ResponseFormat};
use serde_json::{json, Value};

use crate::guideline::Guideline;

pub const SINGLE_SCHEMA_NAME: &str = "instruction_compliance";
pub const MULTI_SCHEMA_NAME: &str = "guidelines_compliance";

const SINGLE_SYSTEM_PROMPT: &str = "You are a strict compliance grader. \
You receive one instruction and one text, each enclosed between separator lines. \
Judge only how well the text follows the instruction. \
Rate compliance as an integer from 0 (ignores the instruction entirely) to 10 (fully complies). \
Give short reasons that point at concrete parts of the text. \
Respond with JSON only: {\"score\": <integer 0-10>, \"reasons\": [<string>, ...]}.";

const MULTI_SYSTEM_PROMPT: &str = "You are a strict compliance grader. \
You receive several guidelines and one text, each enclosed between separator lines. \
Each guideline is identified by the title in its separator line. \
For every guideline, rate how well the text follows it as an integer from 0 (ignores it entirely) to 10 (fully complies) \
and give short reasons that point at concrete parts of the text. \
Return exactly one entry per guideline and copy each title exactly. \
Respond with JSON only: {\"results\": [{\"title\": <string>, \"score\": <integer 0-10>, \"reasons\": [<string>, ...]}, ...]}.";

fn score_property() -> Value {
    json!({ "type": "integer", "minimum": 0, "maximum": 10 })
}

fn reasons_property() -> Value {
    json!({ "type": "array", "items": { "type": "string" } })
}

/// Schema for `{score, reasons}`.
pub fn single_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "score": score_property(),
            "reasons": reasons_property(),
        },
        "required": ["score", "reasons"],
        "additionalProperties": false,
    })
}

/// Schema for `{results: [{title, score, reasons}]}`.
pub fn multi_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "results": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "score": score_property(),
                        "reasons": reasons_property(),
                    },
                    "required": ["title", "score", "reasons"],
                    "additionalProperties": false,
                }
            }
        },
        "required": ["results"],
        "additionalProperties": false,
    })
}

fn push_block(out: &mut String, label: &str, body: &str) {
    out.push_str("-----BEGIN ");
    out.push_str(label);
    out.push_str("-----\n");
    out.push_str(body);
    out.push_str("\n-----END ");
    out.push_str(label);
    out.push_str("-----\n");
}

/// User message for one instruction against one text.
pub fn single_user_message(instruction: &str, text: &str) -> String {
    let mut out = String::with_capacity(instruction.len() + text.len() + 96);
    push_block(&mut out, "INSTRUCTION", instruction);
    push_block(&mut out, "TEXT", text);
    out
}

/// User message for several guidelines against one text.
pub fn multi_user_message(guidelines: &[Guideline], text: &str) -> String {
    let mut out = String::new();
    for g in guidelines {
        push_block(&mut out, &format!("GUIDELINE: {}", g.title), &g.instruction);
    }
    push_block(&mut out, "TEXT", text);
    out
}

/// Request for the single-instruction schema.
pub fn build_single_request(instruction: &str, text: &str, max_tokens: u32) -> CompletionRequest {
    CompletionRequest {
        messages: vec![
            ChatMessage::system(SINGLE_SYSTEM_PROMPT),
            ChatMessage::user(single_user_message(instruction, text)),
        ],
        response_format: ResponseFormat::JsonSchema {
            name: SINGLE_SCHEMA_NAME.to_string(),
            schema: single_schema(),
            strict: true,
        },
        max_tokens,
    }
}

/// Request for the multi-guideline schema.
pub fn build_multi_request(
    guidelines: &[Guideline],
    text: &str,
    max_tokens: u32,
) -> CompletionRequest {
    CompletionRequest {
        messages: vec![
            ChatMessage::system(MULTI_SYSTEM_PROMPT),
            ChatMessage::user(multi_user_message(guidelines, text)),
        ],
        response_format: ResponseFormat::JsonSchema {
            name: MULTI_SCHEMA_NAME.to_string(),
            schema: multi_schema(),
            strict: true,
        },
        max_tokens,
    }
}
