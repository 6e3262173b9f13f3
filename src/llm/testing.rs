//! Scripted client for tests that must not touch the network.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatMessage, ChatOptions, Completion, LlmClient, Provider, ProviderError, TokenUsage};

/// A request seen by [`ScriptedClient`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub options: ChatOptions,
}

impl RecordedRequest {
    /// Text of the last user message.
    pub fn prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == super::Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }

    pub fn system(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == super::Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

type Responder = Box<dyn Fn(&RecordedRequest) -> Result<String, ProviderError> + Send + Sync>;

/// Replays queued replies in order; falls back to a responder once the queue is empty.
pub struct ScriptedClient {
    provider: Provider,
    queue: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: Option<Responder>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedClient {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            queue: Mutex::new(VecDeque::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    pub fn fail(self, error: ProviderError) -> Self {
        self.push(Err(error));
        self
    }

    /// Answer every request not covered by the queue.
    pub fn respond_with<F>(mut self, responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(responder));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn push(&self, item: Result<String, ProviderError>) {
        self.queue.lock().unwrap().push_back(item);
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<Completion, ProviderError> {
        let request = RecordedRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            options: options.clone(),
        };
        self.requests.lock().unwrap().push(request.clone());

        let queued = self.queue.lock().unwrap().pop_front();
        let outcome = match (queued, &self.fallback) {
            (Some(item), _) => item,
            (None, Some(responder)) => responder(&request),
            (None, None) => Err(ProviderError::malformed_response(
                "script exhausted".to_string(),
            )),
        };

        outcome.map(|text| {
            let prompt_tokens = (request.prompt().len() as u64 + 3) / 4;
            let completion_tokens = (text.len() as u64 + 3) / 4;
            Completion::new(text, model)
                .with_usage(TokenUsage::new(prompt_tokens, completion_tokens))
        })
    }
}
