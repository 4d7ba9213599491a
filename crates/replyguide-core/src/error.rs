//! Configuration and input errors.
//!
//! These are the only failures that leave the scoring layer: they mean the
//! declared guideline set or input shape is unusable, so the run halts.
//! Model-call and response-shape failures never surface here; they become
//! tagged score values instead.

/// Errors that abort an evaluation run.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("guideline set is empty")]
    NoGuidelines,

    #[error("guideline #{index} has an empty title")]
    EmptyGuidelineTitle { index: usize },

    #[error("duplicate guideline title: {title}")]
    DuplicateGuideline { title: String },

    #[error("unknown guideline: {title}")]
    UnknownGuideline { title: String },

    #[error("no columns selected for evaluation")]
    NoColumns,

    #[error("column {column:?} missing from row {row}")]
    MissingColumn { column: String, row: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for configuration-level operations.
pub type Result<T> = std::result::Result<T, EvalError>;
