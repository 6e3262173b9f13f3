//! OpenAI chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::{ProviderError, RetryConfig};
use super::transport::{http_client, send_json, with_retry};
use super::{ChatMessage, ChatOptions, Completion, LlmClient, Provider, TokenUsage};
use crate::config::{DEFAULT_OPENAI_BASE_URL, DEFAULT_REQUEST_TIMEOUT};

/// OpenAI API client with automatic retry for transient errors.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry_config: RetryConfig,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_OPENAI_BASE_URL.to_string())
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

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn execute_request(
        &self,
        request: &ChatRequest<'_>,
    ) -> Result<Completion, ProviderError> {
        let response: ChatResponse = send_json(
            self.client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .json(request),
        )
        .await?;

        into_completion(response, request.model)
    }
}

fn into_completion(
    response: ChatResponse,
    requested_model: &str,
) -> Result<Completion, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::malformed_response("No choices in response".to_string()))?;

    let text = choice
        .message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ProviderError::malformed_response("Empty completion".to_string()))?;

    Ok(Completion {
        text,
        model: response
            .model
            .unwrap_or_else(|| requested_model.to_string()),
        usage: response
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
        finish_reason: choice.finish_reason,
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<Completion, ProviderError> {
        let request = ChatRequest {
            model,
            messages,
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
        };

        tracing::debug!(model, messages = messages.len(), "Sending request to OpenAI");

        let request = &request;
        with_retry(Provider::OpenAi, &self.retry_config, move || {
            self.execute_request(request)
        })
        .await
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
