//! In-memory test doubles for [`ChatModel`] (testing only)
//!
//! `ScriptedModel` answers from a closure, optionally after a per-request
//! delay, and records every request it receives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::ChatModel;
use crate::error::{LlmError, LlmResult};
use crate::types::CompletionRequest;

type Responder = dyn Fn(&CompletionRequest) -> LlmResult<String> + Send + Sync;
type DelayFn = dyn Fn(&CompletionRequest) -> Duration + Send + Sync;

/// Model double driven by a closure.
pub struct ScriptedModel {
    respond: Box<Responder>,
    delay: Option<Box<DelayFn>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    /// Answer every request with `respond(request)`.
    pub fn from_fn<F>(respond: F) -> Self
    where
        F: Fn(&CompletionRequest) -> LlmResult<String> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::from_fn(move |_| Ok(text.clone()))
    }

    /// Always fail with `LlmError::Call(message)`.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::from_fn(move |_| Err(LlmError::Call(message.clone())))
    }

    /// Sleep for `delay(request)` before answering.
    pub fn with_delay<D>(mut self, delay: D) -> Self
    where
        D: Fn(&CompletionRequest) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Box::new(delay));
        self
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every request received, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(request)).await;
        }

        (self.respond)(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, ResponseFormat};

    #[tokio::test]
    async fn test_scripted_model_records_requests() {
        let model = ScriptedModel::from_fn(|req| Ok(req.user_content().to_uppercase()));
        let request = CompletionRequest {
            messages: vec![ChatMessage::user("hello")],
            response_format: ResponseFormat::Text,
            max_tokens: 5,
        };

        assert_eq!(model.complete(&request).await.unwrap(), "HELLO");
        assert_eq!(model.calls(), 1);
        assert_eq!(model.requests()[0], request);
    }
}
