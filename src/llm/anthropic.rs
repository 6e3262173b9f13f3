//! Anthropic messages-API client.
//!
//! The messages API takes the system prompt as a top-level field, so system messages are
//! lifted out of the conversation before sending.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::{ProviderError, RetryConfig};
use super::transport::{http_client, send_json, with_retry};
use super::{ChatMessage, ChatOptions, Completion, LlmClient, Provider, Role, TokenUsage};
use crate::config::{DEFAULT_ANTHROPIC_BASE_URL, DEFAULT_REQUEST_TIMEOUT};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Used when a caller leaves `max_tokens` unset; the API requires it.
const DEFAULT_MAX_TOKENS: u64 = 1024;

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry_config: RetryConfig,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_ANTHROPIC_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_config: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Bound every request, connection included, to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    async fn execute_request(
        &self,
        request: &MessagesRequest<'_>,
    ) -> Result<Completion, ProviderError> {
        let response: MessagesResponse = send_json(
            self.client
                .post(format!("{}/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(request),
        )
        .await?;

        into_completion(response, request.model)
    }
}

fn build_request<'a>(
    model: &'a str,
    messages: &'a [ChatMessage],
    options: &ChatOptions,
) -> MessagesRequest<'a> {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    MessagesRequest {
        model,
        system: (!system.is_empty()).then(|| system.join("\n\n")),
        messages: messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| WireMessage {
                role: m.role,
                content: &m.content,
            })
            .collect(),
        max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        temperature: options.temperature,
        top_p: options.top_p,
    }
}

fn into_completion(
    response: MessagesResponse,
    requested_model: &str,
) -> Result<Completion, ProviderError> {
    let text: String = response
        .content
        .iter()
        .filter(|block| block.block_type == "text")
        .filter_map(|block| block.text.as_deref())
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(ProviderError::malformed_response(
            "No text content in response".to_string(),
        ));
    }

    Ok(Completion {
        text,
        model: response
            .model
            .unwrap_or_else(|| requested_model.to_string()),
        usage: response
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens)),
        finish_reason: response.stop_reason,
    })
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<Completion, ProviderError> {
        let request = build_request(model, messages, options);

        tracing::debug!(model, messages = request.messages.len(), "Sending request to Anthropic");

        let request = &request;
        with_retry(Provider::Anthropic, &self.retry_config, move || {
            self.execute_request(request)
        })
        .await
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_are_lifted() {
        let messages = vec![
            ChatMessage::system("You are a showrunner."),
            ChatMessage::user("Review this scene."),
        ];
        let options = ChatOptions {
            temperature: Some(0.3),
            ..ChatOptions::default()
        };
        let request = build_request("claude-3-5-sonnet-20241022", &messages, &options);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["system"], "You are a showrunner.");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn text_blocks_are_concatenated() {
        let body = r#"{
            "content": [{"type": "text", "text": "INT. GAZEBO"}, {"type": "text", "text": " - DAY"}],
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 30, "output_tokens": 7}
        }"#;
        let response: MessagesResponse = serde_json::from_str(body).unwrap();
        let completion = into_completion(response, "claude").unwrap();

        assert_eq!(completion.text, "INT. GAZEBO - DAY");
        assert_eq!(completion.usage, Some(TokenUsage::new(30, 7)));
        assert_eq!(completion.finish_reason.as_deref(), Some("end_turn"));
    }

    #[test]
    fn response_without_text_is_malformed() {
        let response: MessagesResponse = serde_json::from_str(r#"{"content": []}"#).unwrap();
        assert!(into_completion(response, "claude").is_err());
    }
}
