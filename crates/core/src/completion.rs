use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::UpstreamError;

pub const CHAT_MODEL: &str = "gpt-3.5-turbo";

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// One message of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

/// Single-shot chat completion. The contract is only that one fully
/// assembled response text comes back per invocation; streaming transports
/// would satisfy the same contract once drained.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, UpstreamError>;
}

pub struct OpenAiChatModel {
    endpoint: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiChatModel {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(OPENAI_CHAT_URL, api_key, CHAT_MODEL)
    }

    pub fn with_endpoint(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, UpstreamError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": messages,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status {
                service: "openai-chat",
                status: response.status().as_u16(),
            });
        }

        let payload: Value = response.json().await?;
        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| UpstreamError::Malformed {
                service: "openai-chat",
                details: "missing choices[0].message.content".to_string(),
            })?;

        Ok(content.to_string())
    }
}
