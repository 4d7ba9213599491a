//! Batch evaluation over tabular rows.
//!
//! Every (column, row, sample) becomes one work unit, split further per
//! guideline when the scorer makes one call per guideline. Units run as
//! futures joined on the caller's task; a FIFO semaphore caps how many are
//! awaiting the model at once. Results are folded into an
//! [`AggregationTable`] laid out in declaration order, so completion order
//! never shows in the output.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use replyguide_llm::CallGauge;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, Instrument};

use crate::error::{EvalError, Result};
use crate::guideline::{Guideline, GuidelineSet};
use crate::metric::{GuidelineScorer, ScoreBatching};
use crate::metrics::METRICS;
use crate::obs::{
    batch_span, emit_batch_finished, emit_batch_started, emit_measurement_excluded,
};
use crate::score::{FailureKind, ScoreResult};
use crate::stats::summarize;
use crate::table::AggregationTable;

/// One input record: column name → cell text.
pub type Row = HashMap<String, String>;

/// Default cap on simultaneously in-flight model calls.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// What the batch does with a measurement carrying a failure tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Leave it out of the sample; it is logged and counted.
    #[default]
    Exclude,
    /// Keep the substituted fallback value in the sample.
    Substitute,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_concurrent: usize,
    /// Measurements per (column, row).
    pub samples: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            samples: 1,
            failure_policy: FailurePolicy::Exclude,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(EvalError::InvalidConfig(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.samples == 0 {
            return Err(EvalError::InvalidConfig(
                "samples must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one [`BatchEvaluator::evaluate`] run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: String,
    pub mode: ScoreBatching,
    pub table: AggregationTable,
    /// Scored guideline measurements, failures included.
    pub measurements: usize,
    /// Measurements carrying a failure tag.
    pub failures: usize,
    /// Failures left out under [`FailurePolicy::Exclude`].
    pub excluded: usize,
    /// Blank cells that were not scored.
    pub skipped_blank: usize,
    pub duration_ms: u64,
    /// Highest in-flight model call count, when a gauge was attached.
    pub peak_in_flight: Option<usize>,
}

struct WorkUnit<'a> {
    column: usize,
    /// Index of `guidelines[0]` in the full set.
    first: usize,
    guidelines: &'a [Guideline],
    text: &'a str,
}

#[derive(Default)]
struct Cell {
    scores: Vec<f64>,
    failures: usize,
}

/// Drives a [`GuidelineScorer`] over many rows under bounded concurrency.
pub struct BatchEvaluator {
    scorer: Arc<dyn GuidelineScorer>,
    config: BatchConfig,
    gauge: Option<Arc<CallGauge>>,
}

impl BatchEvaluator {
    pub fn new(scorer: Arc<dyn GuidelineScorer>) -> Self {
        Self {
            scorer,
            config: BatchConfig::default(),
            gauge: None,
        }
    }

    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Report the peak of `gauge` in the batch summary.
    pub fn with_gauge(mut self, gauge: Arc<CallGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    /// Score `columns` of every row against `guidelines`.
    ///
    /// Fails only on unusable input: no columns, a duplicate column, a
    /// column missing from some row, or an invalid [`BatchConfig`]. Model
    /// failures are handled per measurement by the [`FailurePolicy`].
    pub async fn evaluate(
        &self,
        rows: &[Row],
        columns: &[String],
        guidelines: &GuidelineSet,
    ) -> Result<BatchReport> {
        self.config.validate()?;
        check_columns(rows, columns)?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let span = batch_span(&run_id);
        self.run(run_id, rows, columns, guidelines)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        run_id: String,
        rows: &[Row],
        columns: &[String],
        guidelines: &GuidelineSet,
    ) -> Result<BatchReport> {
        let started = Instant::now();
        let mode = self.scorer.batching();
        let guideline_list = guidelines.as_slice();

        let mut skipped_blank = 0;
        let mut units = Vec::new();
        for (column, name) in columns.iter().enumerate() {
            for row in rows {
                // Presence was checked up front.
                let Some(text) = row.get(name) else { continue };
                if text.trim().is_empty() {
                    skipped_blank += 1;
                    continue;
                }
                for _ in 0..self.config.samples {
                    push_units(&mut units, mode, column, guideline_list, text);
                }
            }
        }

        emit_batch_started(
            &run_id,
            &mode.to_string(),
            rows.len(),
            columns.len(),
            units.len(),
        );

        let semaphore = Semaphore::new(self.config.max_concurrent);
        let scorer = &self.scorer;
        let outcomes = join_all(units.iter().map(|unit| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.ok();
                scorer.score(unit.guidelines, unit.text).await
            }
        }))
        .await;

        let mut cells: Vec<Vec<Cell>> = columns
            .iter()
            .map(|_| guideline_list.iter().map(|_| Cell::default()).collect())
            .collect();
        let mut measurements = 0;
        let mut failures = 0;
        let mut excluded = 0;

        for (unit, results) in units.iter().zip(outcomes) {
            let results = results.into_iter().take(unit.guidelines.len());
            for (offset, result) in results.enumerate() {
                let index = unit.first + offset;
                let cell = &mut cells[unit.column][index];
                measurements += 1;
                if result.failure.is_some() {
                    failures += 1;
                }

                if let Some(kind) = self.record(cell, &result) {
                    emit_measurement_excluded(
                        &columns[unit.column],
                        &guideline_list[index].title,
                        kind,
                    );
                    excluded += 1;
                    METRICS.inc_excluded();
                }
            }
        }

        let mut table = AggregationTable::new();
        for (column, name) in columns.iter().enumerate() {
            for (index, guideline) in guideline_list.iter().enumerate() {
                let cell = &cells[column][index];
                table.insert(
                    name,
                    &guideline.title,
                    summarize(&cell.scores).with_failures(cell.failures),
                );
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let peak_in_flight = self.gauge.as_ref().map(|g| g.peak());
        emit_batch_finished(
            &run_id,
            duration_ms,
            measurements,
            failures,
            peak_in_flight.unwrap_or(0),
        );
        METRICS.flush();

        Ok(BatchReport {
            run_id,
            mode,
            table,
            measurements,
            failures,
            excluded,
            skipped_blank,
            duration_ms,
            peak_in_flight,
        })
    }

    /// Fold one measurement into its cell. Returns the failure kind when
    /// the measurement was excluded.
    fn record(&self, cell: &mut Cell, result: &ScoreResult) -> Option<FailureKind> {
        let Some(kind) = result.failure else {
            cell.scores.push(result.score);
            return None;
        };
        cell.failures += 1;
        match self.config.failure_policy {
            FailurePolicy::Substitute => {
                cell.scores.push(result.score);
                None
            }
            FailurePolicy::Exclude => {
                debug!(%kind, score = result.score, "excluding tagged failure");
                Some(kind)
            }
        }
    }
}

fn push_units<'a>(
    units: &mut Vec<WorkUnit<'a>>,
    mode: ScoreBatching,
    column: usize,
    guidelines: &'a [Guideline],
    text: &'a str,
) {
    match mode {
        ScoreBatching::AllGuidelines => units.push(WorkUnit {
            column,
            first: 0,
            guidelines,
            text,
        }),
        ScoreBatching::PerGuideline => {
            for (first, guideline) in guidelines.iter().enumerate() {
                units.push(WorkUnit {
                    column,
                    first,
                    guidelines: std::slice::from_ref(guideline),
                    text,
                });
            }
        }
    }
}

fn check_columns(rows: &[Row], columns: &[String]) -> Result<()> {
    if columns.is_empty() {
        return Err(EvalError::NoColumns);
    }
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.as_str()) {
            return Err(EvalError::InvalidConfig(format!(
                "duplicate column: {column}"
            )));
        }
    }
    for (row_index, row) in rows.iter().enumerate() {
        if let Some(column) = columns.iter().find(|c| !row.contains_key(c.as_str())) {
            return Err(EvalError::MissingColumn {
                column: column.clone(),
                row: row_index,
            });
        }
    }
    Ok(())
}
