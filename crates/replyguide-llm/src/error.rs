//! Error types for replyguide-llm

use thiserror::Error;

/// Errors raised by a model call.
///
/// Every variant is a transport-level failure from the caller's point of
/// view: the scoring layer never inspects the variant, it only records the
/// message as a diagnostic.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Request could not be sent or the body could not be read
    #[error("HTTP error: {0}")]
    Http(String),

    /// Provider answered with a non-success status
    #[error("model provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Provider answered 2xx but without a message content
    #[error("model response has no message content")]
    MissingContent,

    /// Response envelope was not valid JSON
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Client could not be configured
    #[error("invalid model configuration: {0}")]
    Config(String),

    /// Failure injected by a test double or wrapper
    #[error("model call failed: {0}")]
    Call(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Http(err.to_string())
    }
}

/// Result type for model calls
pub type LlmResult<T> = std::result::Result<T, LlmError>;
