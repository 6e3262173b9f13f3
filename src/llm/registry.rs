//! One client per hosted provider.

use std::collections::HashMap;
use std::sync::Arc;

use super::{AnthropicClient, LlmClient, OpenAiClient, Provider};
use crate::config::Config;

/// Maps each [`Provider`] to the client that serves it.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<Provider, Arc<dyn LlmClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the OpenAI and Anthropic HTTP clients from configuration.
    pub fn from_config(config: &Config) -> Self {
        let openai = OpenAiClient::with_base_url(
            config.openai.api_key.clone(),
            config.openai.base_url.clone(),
        )
        .with_timeout(config.request_timeout);
        let anthropic = AnthropicClient::with_base_url(
            config.anthropic.api_key.clone(),
            config.anthropic.base_url.clone(),
        )
        .with_timeout(config.request_timeout);

        Self::new()
            .with_client(Arc::new(openai))
            .with_client(Arc::new(anthropic))
    }

    /// Register a client under the provider it reports.
    pub fn with_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.clients.insert(client.provider(), client);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn LlmClient>> {
        self.clients.get(&provider).cloned()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<_> = self.clients.keys().collect();
        providers.sort();
        f.debug_struct("ProviderRegistry")
            .field("providers", &providers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_registers_both_providers() {
        let config = Config::new("sk-o".into(), "sk-a".into());
        let registry = ProviderRegistry::from_config(&config);

        assert_eq!(
            registry.get(Provider::OpenAi).map(|c| c.provider()),
            Some(Provider::OpenAi)
        );
        assert_eq!(
            registry.get(Provider::Anthropic).map(|c| c.provider()),
            Some(Provider::Anthropic)
        );
    }

    #[test]
    fn empty_registry_has_no_clients() {
        assert!(ProviderRegistry::new().get(Provider::OpenAi).is_none());
    }
}
