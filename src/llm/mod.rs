//! Model capability layer.
//!
//! Every pipeline stage talks to a hosted model through the [`LlmClient`] trait. Two
//! HTTP implementations exist (OpenAI chat completions and the Anthropic messages API);
//! [`ProviderRegistry`] hands out the right one for a stage's [`Provider`].

mod anthropic;
mod error;
mod openai;
mod registry;
mod transport;

#[cfg(test)]
pub mod testing;

pub use anthropic::AnthropicClient;
pub use error::{
    classify_http_status, parse_retry_after, ProviderError, ProviderErrorKind, RetryConfig,
};
pub use openai::OpenAiClient;
pub use registry::ProviderRegistry;

pub(crate) use transport::http_client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Hosted model vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::OpenAi => f.write_str("openai"),
            Provider::Anthropic => f.write_str("anthropic"),
        }
    }
}

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Sampling parameters for one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u64>,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Result of one model call: always exactly one text body.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Model that actually served the request
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

impl Completion {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            usage: None,
            finish_reason: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// A hosted text-generation capability.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Vendor behind this client.
    fn provider(&self) -> Provider;

    /// Run one chat completion.
    ///
    /// Transient failures may be retried internally; the returned error is the last
    /// one observed.
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<Completion, ProviderError>;
}
