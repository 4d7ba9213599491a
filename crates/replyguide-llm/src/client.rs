//! Model-call interface and the OpenAI-compatible HTTP backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{LlmError, LlmResult};
use crate::types::{CompletionRequest, ModelConfig, ResponseFormat};

/// An opaque text-generation call.
///
/// Returns the text payload of the completion or fails. No streaming and
/// no partial results.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<String>;
}

#[async_trait]
impl<M: ChatModel + ?Sized> ChatModel for Arc<M> {
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<String> {
        (**self).complete(request).await
    }
}

/// Client for `/chat/completions` on any OpenAI-compatible endpoint.
pub struct OpenAiChatClient {
    config: ModelConfig,
    http_client: reqwest::Client,
}

impl OpenAiChatClient {
    /// Create a client from an explicit configuration.
    pub fn new(config: ModelConfig) -> LlmResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::Config("api key is empty".to_string()));
        }
        if config.model_id.trim().is_empty() {
            return Err(LlmError::Config("model id is empty".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("replyguide/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.config.model_id
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url())
    }
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<String> {
        let payload = build_payload(&self.config.model_id, request);
        debug!(model = %self.config.model_id, max_tokens = request.max_tokens, "sending completion");

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response.json().await?;
        extract_content(&value).ok_or(LlmError::MissingContent)
    }
}

/// Build the JSON body for a chat completion request.
pub fn build_payload(model_id: &str, request: &CompletionRequest) -> Value {
    let mut payload = json!({
        "model": model_id,
        "messages": request.messages,
        "max_tokens": request.max_tokens,
    });

    if let (Some(obj), ResponseFormat::JsonSchema { name, schema, strict }) =
        (payload.as_object_mut(), &request.response_format)
    {
        obj.insert(
            "response_format".to_string(),
            json!({
                "type": "json_schema",
                "json_schema": {
                    "name": name,
                    "schema": schema,
                    "strict": strict,
                }
            }),
        );
    }

    payload
}

/// Extract `choices[0].message.content` from a chat completion.
pub fn extract_content(value: &Value) -> Option<String> {
    value
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    fn request(format: ResponseFormat) -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("usr")],
            response_format: format,
            max_tokens: 200,
        }
    }

    #[test]
    fn test_payload_carries_json_schema_format() {
        let schema = json!({"type": "object"});
        let payload = build_payload(
            "gpt-4o-mini",
            &request(ResponseFormat::JsonSchema {
                name: "score".to_string(),
                schema: schema.clone(),
                strict: true,
            }),
        );

        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(payload["max_tokens"], 200);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "usr");
        assert_eq!(payload["response_format"]["type"], "json_schema");
        assert_eq!(payload["response_format"]["json_schema"]["name"], "score");
        assert_eq!(payload["response_format"]["json_schema"]["schema"], schema);
        assert_eq!(payload["response_format"]["json_schema"]["strict"], true);
    }

    #[test]
    fn test_payload_omits_format_for_text() {
        let payload = build_payload("m", &request(ResponseFormat::Text));
        assert!(payload.get("response_format").is_none());
    }

    #[test]
    fn test_extract_content() {
        let value = json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"score\": 7}"}}]
        });
        assert_eq!(extract_content(&value).as_deref(), Some("{\"score\": 7}"));
        assert_eq!(extract_content(&json!({"choices": []})), None);
        assert_eq!(
            extract_content(&json!({"choices": [{"message": {"content": null}}]})),
            None
        );
    }

    #[test]
    fn test_client_rejects_empty_key() {
        let err = OpenAiChatClient::new(ModelConfig::new("  ", "m")).err();
        assert!(matches!(err, Some(LlmError::Config(_))));
    }

    #[test]
    fn test_endpoint_uses_base_url() {
        let client = OpenAiChatClient::new(
            ModelConfig::new("k", "m").with_base_url("http://localhost:9000/v1/"),
        )
        .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9000/v1/chat/completions");
        assert_eq!(client.model_id(), "m");
    }
}
