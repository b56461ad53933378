//! Dispatch of model calls to the client of the model's provider.

use async_trait::async_trait;
use cantor_core::{ProviderRegistry, StructuredOutput};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{ClientFactoryRegistry, ModelClient, ModelRequest, ProviderError};

/// A [`ModelClient`] that forwards each request to the client registered
/// for the provider its model id resolves to.
pub struct ClientRouter {
    registry: ProviderRegistry,
    clients: HashMap<String, Arc<dyn ModelClient>>,
}

impl ClientRouter {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            clients: HashMap::new(),
        }
    }

    /// Register the client serving `provider`.
    pub fn with_client(mut self, provider: impl Into<String>, client: Arc<dyn ModelClient>) -> Self {
        self.clients.insert(provider.into().to_lowercase(), client);
        self
    }

    /// Build a client for every configured provider entry.
    pub fn from_config(
        registry: ProviderRegistry,
        factories: &ClientFactoryRegistry,
        providers: &BTreeMap<String, JsonValue>,
    ) -> Result<Self, ProviderError> {
        let mut router = Self::new(registry);
        for (provider, config) in providers {
            let client = factories.create(provider, config)?;
            tracing::debug!(provider = %provider, client = client.name(), "Registered model client");
            router = router.with_client(provider.as_str(), client);
        }
        Ok(router)
    }

    /// Provider ids that have a client.
    pub fn providers(&self) -> Vec<&str> {
        let mut providers: Vec<&str> = self.clients.keys().map(|s| s.as_str()).collect();
        providers.sort_unstable();
        providers
    }
}

#[async_trait]
impl ModelClient for ClientRouter {
    async fn call_model(&self, request: &ModelRequest) -> Result<StructuredOutput, ProviderError> {
        let provider = self.registry.resolve(&request.model);
        let client = self.clients.get(&provider).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "no client for provider '{}' (model '{}')",
                provider, request.model
            ))
        })?;
        client.call_model(request).await
    }

    fn name(&self) -> &str {
        "router"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantor_core::OutputSchema;

    struct FixedClient(&'static str);

    #[async_trait]
    impl ModelClient for FixedClient {
        async fn call_model(&self, _request: &ModelRequest) -> Result<StructuredOutput, ProviderError> {
            Ok(StructuredOutput::draft(self.0))
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    fn request(model: &str) -> ModelRequest {
        ModelRequest {
            model: model.to_string(),
            system_prompt: String::new(),
            user_prompt: String::new(),
            schema: OutputSchema::Draft,
        }
    }

    fn router() -> ClientRouter {
        ClientRouter::new(ProviderRegistry::default())
            .with_client("anthropic", Arc::new(FixedClient("anthropic")))
            .with_client("openai", Arc::new(FixedClient("openai")))
    }

    #[tokio::test]
    async fn test_routes_by_model_prefix() {
        let router = router();
        let output = router.call_model(&request("claude-sonnet-4-5")).await.unwrap();
        assert_eq!(output, StructuredOutput::draft("anthropic"));

        let output = router.call_model(&request("gpt-4o")).await.unwrap();
        assert_eq!(output, StructuredOutput::draft("openai"));
    }

    #[tokio::test]
    async fn test_unknown_model_uses_default_provider() {
        let output = router().call_model(&request("llama-3-70b")).await.unwrap();
        assert_eq!(output, StructuredOutput::draft("openai"));
    }

    #[tokio::test]
    async fn test_missing_client_is_not_configured() {
        let result = router().call_model(&request("gemini-2.5-pro")).await;
        match result {
            Err(ProviderError::NotConfigured(msg)) => assert!(msg.contains("google")),
            other => panic!("Expected NotConfigured, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_config_builds_empty_router() {
        let router = ClientRouter::from_config(
            ProviderRegistry::default(),
            &ClientFactoryRegistry::new(),
            &BTreeMap::new(),
        )
        .unwrap();
        assert!(router.providers().is_empty());
    }
}
