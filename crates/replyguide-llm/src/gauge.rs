//! In-flight instrumentation around the model-call boundary.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::client::ChatModel;
use crate::error::LlmResult;
use crate::types::CompletionRequest;

/// Shared counters observed by a [`GaugedModel`].
#[derive(Debug, Default)]
pub struct CallGauge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicU64,
    failed: AtomicU64,
}

impl CallGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls currently awaiting the inner model.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest simultaneous in-flight count seen so far.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlight {
            gauge: self,
            ok: false,
        }
    }
}

/// Releases one in-flight slot on drop, including when the call future is
/// cancelled. A call that never completed counts as failed.
struct InFlight<'a> {
    gauge: &'a CallGauge,
    ok: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.gauge.in_flight.fetch_sub(1, Ordering::SeqCst);
        if !self.ok {
            self.gauge.failed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Wraps a [`ChatModel`] and counts calls in flight.
pub struct GaugedModel<M> {
    inner: M,
    gauge: Arc<CallGauge>,
}

impl<M: ChatModel> GaugedModel<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            gauge: Arc::new(CallGauge::new()),
        }
    }

    /// Handle to the counters, valid after the model is moved elsewhere.
    pub fn gauge(&self) -> Arc<CallGauge> {
        Arc::clone(&self.gauge)
    }
}

#[async_trait]
impl<M: ChatModel> ChatModel for GaugedModel<M> {
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<String> {
        let mut guard = self.gauge.enter();
        let result = self.inner.complete(request).await;
        guard.ok = result.is_ok();
        result
    }
}
