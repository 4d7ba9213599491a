use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::batch::BatchReport;
use crate::guideline::GuidelineSet;
use crate::metric::ScoreBatching;
use crate::score::Outcome;
use crate::stats::StatSummary;
use crate::table::AggregationTable;

pub const REPORT_SCHEMA_VERSION: &str = "1.0";

/// Run totals persisted next to the table.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchTotalsArtifact {
    pub measurements: usize,
    pub failures: usize,
    pub excluded: usize,
    pub skipped_blank: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_in_flight: Option<usize>,
}

/// Canonical batch report written after a scoring run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchReportArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub run_id: String,
    pub model_id: String,
    pub mode: ScoreBatching,
    pub guideline_digest: String,
    pub totals: BatchTotalsArtifact,
    pub table: AggregationTable,
}

impl BatchReportArtifact {
    pub fn from_report(
        report: &BatchReport,
        model_id: &str,
        guidelines: &GuidelineSet,
    ) -> Result<Self> {
        Ok(Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            run_id: report.run_id.clone(),
            model_id: model_id.to_string(),
            mode: report.mode,
            guideline_digest: guidelines.digest().context("digest guideline set")?,
            totals: BatchTotalsArtifact {
                measurements: report.measurements,
                failures: report.failures,
                excluded: report.excluded,
                skipped_blank: report.skipped_blank,
                duration_ms: report.duration_ms,
                peak_in_flight: report.peak_in_flight,
            },
            table: report.table.clone(),
        })
    }
}

/// Write the report as pretty JSON.
pub fn write_report_json(path: &Path, artifact: &BatchReportArtifact) -> Result<()> {
    let content = serde_json::to_string_pretty(artifact).context("serialize batch report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

fn fmt_score(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.3}")
    } else {
        "n/a".to_string()
    }
}

fn fmt_row(title: &str, s: &StatSummary) -> String {
    let (mean, stddev) = match s.outcome() {
        Outcome::Score(average) => (fmt_score(average), fmt_score(s.stddev)),
        _ => ("n/a".to_string(), "n/a".to_string()),
    };
    format!(
        "| {} | {} | {} | {} | {} |\n",
        title, mean, stddev, s.count, s.failures
    )
}

/// Render one Markdown table per group, in table order.
pub fn render_table_md(table: &AggregationTable) -> String {
    let mut out = String::new();
    out.push_str("# Guideline Compliance\n");
    for group in table.groups() {
        out.push_str(&format!("\n## {}\n\n", group.name));
        out.push_str("| Guideline | Mean | Std dev | Samples | Failures |\n");
        out.push_str("|---|---|---|---|---|\n");
        for g in &group.guidelines {
            out.push_str(&fmt_row(&g.title, &g.summary));
        }
    }
    out
}

pub fn write_table_md(path: &Path, table: &AggregationTable) -> Result<()> {
    let md = render_table_md(table);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
