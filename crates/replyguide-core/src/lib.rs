//! replyguide core library
//!
//! Scores brand review replies for compliance with written guidelines using
//! an LLM judge, and aggregates those scores across batches of rows.

pub mod batch;
pub mod config;
pub mod error;
pub mod guideline;
pub mod metric;
pub mod metrics;
pub mod obs;
pub mod report;
pub mod request;
pub mod score;
pub mod stats;
pub mod table;
pub mod telemetry;
pub mod validate;

pub use batch::{BatchConfig, BatchEvaluator, BatchReport, FailurePolicy, Row};
pub use config::RunConfig;
pub use error::{EvalError, Result};
pub use guideline::{Guideline, GuidelineSet};
pub use metric::{
    scorer_for, ComplianceMetric, GuidelineScorer, MultiGuidelineComplianceMetric, ScoreBatching,
};
pub use report::{render_table_md, write_report_json, write_table_md, BatchReportArtifact};
pub use score::{FailureKind, GuidelineResult, MultiResult, Outcome, ScoreResult};
pub use stats::{summarize, StatSummary};
pub use table::AggregationTable;
pub use telemetry::init_tracing;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
