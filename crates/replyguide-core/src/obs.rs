//! Structured lifecycle events for batch scoring.
//!
//! Batch-level events are `info!`; degraded measurements are `warn!`.
//! Filter with `REPLYGUIDE_LOG` (or `RUST_LOG`), see [`crate::init_tracing`].

use tracing::{info, warn};

use crate::score::FailureKind;

/// Span covering one batch run. Attach it with `Instrument` so every
/// event emitted by the run's futures carries `run_id`.
pub fn batch_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("replyguide.batch", run_id = %run_id)
}

pub fn emit_batch_started(run_id: &str, mode: &str, rows: usize, columns: usize, units: usize) {
    info!(
        event = "batch.started",
        run_id = %run_id,
        mode = %mode,
        rows = rows,
        columns = columns,
        units = units,
    );
}

pub fn emit_batch_finished(
    run_id: &str,
    duration_ms: u64,
    measurements: usize,
    failures: usize,
    peak_in_flight: usize,
) {
    info!(
        event = "batch.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        measurements = measurements,
        failures = failures,
        peak_in_flight = peak_in_flight,
    );
}

/// A measurement degraded to a tagged fallback.
pub fn emit_measurement_fallback(kind: FailureKind, detail: &str) {
    warn!(event = "measurement.fallback", kind = %kind, detail = %detail);
}

/// A failure measurement left out of the statistics for one cell.
pub fn emit_measurement_excluded(group: &str, title: &str, kind: FailureKind) {
    warn!(
        event = "measurement.excluded",
        group = %group,
        title = %title,
        kind = %kind,
    );
}
