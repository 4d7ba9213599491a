//! Process-wide scoring counters.
//!
//! Incremented silently at the call site. [`Metrics::flush`] emits the
//! current values as one `info!` event, typically at the end of a batch.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    model_calls: AtomicU64,
    fallbacks: AtomicU64,
    synthesized: AtomicU64,
    excluded: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            model_calls: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            synthesized: AtomicU64::new(0),
            excluded: AtomicU64::new(0),
        }
    }

    /// One request sent to the chat model.
    pub fn inc_model_calls(&self) {
        self.model_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "model_calls", "counter incremented");
    }

    /// One measurement replaced by a tagged fallback.
    pub fn inc_fallbacks(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fallbacks", "counter incremented");
    }

    /// Guideline entries synthesized because the model omitted them.
    pub fn add_synthesized(&self, n: u64) {
        if n == 0 {
            return;
        }
        self.synthesized.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "synthesized", n, "counter incremented");
    }

    /// One failure measurement left out of the statistics.
    pub fn inc_excluded(&self) {
        self.excluded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "excluded", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            model_calls = self.model_calls(),
            fallbacks = self.fallbacks(),
            synthesized = self.synthesized(),
            excluded = self.excluded(),
        );
    }

    pub fn model_calls(&self) -> u64 {
        self.model_calls.load(Ordering::Relaxed)
    }

    pub fn fallbacks(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    pub fn synthesized(&self) -> u64 {
        self.synthesized.load(Ordering::Relaxed)
    }

    pub fn excluded(&self) -> u64 {
        self.excluded.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.model_calls.store(0, Ordering::Relaxed);
        self.fallbacks.store(0, Ordering::Relaxed);
        self.synthesized.store(0, Ordering::Relaxed);
        self.excluded.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_model_calls();
        m.inc_model_calls();
        m.inc_fallbacks();
        m.add_synthesized(3);
        m.add_synthesized(0);
        m.inc_excluded();

        assert_eq!(m.model_calls(), 2);
        assert_eq!(m.fallbacks(), 1);
        assert_eq!(m.synthesized(), 3);
        assert_eq!(m.excluded(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_model_calls();
        m.inc_fallbacks();
        m.add_synthesized(2);
        m.inc_excluded();
        m.reset();
        assert_eq!(m.model_calls(), 0);
        assert_eq!(m.fallbacks(), 0);
        assert_eq!(m.synthesized(), 0);
        assert_eq!(m.excluded(), 0);
    }
}
