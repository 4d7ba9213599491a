//! replyguide-llm: the model-call boundary
//!
//! Everything the scoring layer knows about a language model lives here:
//! role-tagged messages, a JSON-schema output mode, a token cap, and a
//! single async call that returns text or fails.
//!
//! - [`ChatModel`] is the trait seam; [`OpenAiChatClient`] speaks the
//!   OpenAI-compatible `/chat/completions` protocol.
//! - [`GaugedModel`] wraps any model and counts calls in flight.
//! - [`fakes`] holds deterministic doubles for tests.

pub mod client;
pub mod error;
pub mod fakes;
pub mod gauge;
pub mod types;

pub use client::{build_payload, extract_content, ChatModel, OpenAiChatClient};
pub use error::{LlmError, LlmResult};
pub use gauge::{CallGauge, GaugedModel};
pub use types::{
    ChatMessage, CompletionRequest, ModelConfig, ResponseFormat, Role, DEFAULT_BASE_URL,
};
