//! Client factories for building model clients from configuration.
//!
//! Each adapter registers a factory under a type name. A provider entry
//! in the runtime config picks its factory with an optional `type` key and
//! otherwise uses its own provider id, so a custom provider id can reuse
//! an existing adapter:
//!
//! ```yaml
//! providers:
//!   deepseek: { api_key_env: DEEPSEEK_API_KEY }
//!   local: { type: openai, base_url: "http://localhost:8080/v1", api_key: none }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{ModelClient, ProviderError};

/// Config key selecting a factory by type name.
pub const TYPE_FIELD: &str = "type";

/// Creates [`ModelClient`]s from JSON configuration.
pub trait ClientFactory: Send + Sync {
    /// Unique type name, e.g. "anthropic" or "openai".
    fn provider_type(&self) -> &'static str;

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn ModelClient>, ProviderError>;

    /// Create a client serving a provider id other than the type name.
    fn create_named(
        &self,
        _provider_id: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn ModelClient>, ProviderError> {
        self.create(config)
    }

    /// Check configuration without building a client.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError>;

    fn description(&self) -> &'static str {
        "Model provider"
    }
}

/// Registry of available client factories, keyed by type name.
#[derive(Default)]
pub struct ClientFactoryRegistry {
    factories: BTreeMap<String, Arc<dyn ClientFactory>>,
}

impl ClientFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any with the same type name.
    pub fn register(&mut self, factory: Arc<dyn ClientFactory>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    /// Factory type a provider entry resolves to.
    pub fn factory_type<'a>(provider_id: &'a str, config: &'a JsonValue) -> &'a str {
        config[TYPE_FIELD].as_str().unwrap_or(provider_id)
    }

    /// Build the client for one provider entry.
    pub fn create(
        &self,
        provider_id: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn ModelClient>, ProviderError> {
        let factory_type = Self::factory_type(provider_id, config);
        self.factories
            .get(factory_type)
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "Unknown provider type: '{}'. Available: {:?}",
                    factory_type,
                    self.available_types()
                ))
            })?
            .create_named(provider_id, config)
    }

    /// Validate one provider entry.
    pub fn validate(&self, provider_id: &str, config: &JsonValue) -> Result<(), ProviderError> {
        let factory_type = Self::factory_type(provider_id, config);
        self.factories
            .get(factory_type)
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!("Unknown provider type: '{}'", factory_type))
            })?
            .validate_config(config)
    }

    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_factory(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    /// Registry with every adapter compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "anthropic")]
        registry.register(Arc::new(super::AnthropicClientFactory));

        #[cfg(feature = "openai")]
        {
            registry.register(Arc::new(super::OpenAiCompatibleFactory::openai()));
            registry.register(Arc::new(super::OpenAiCompatibleFactory::deepseek()));
            registry.register(Arc::new(super::OpenAiCompatibleFactory::google()));
        }

        registry
    }
}

impl std::fmt::Debug for ClientFactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFactoryRegistry")
            .field("factories", &self.available_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ModelRequest;
    use async_trait::async_trait;
    use cantor_core::StructuredOutput;

    struct NamedClient {
        name: String,
    }

    #[async_trait]
    impl ModelClient for NamedClient {
        async fn call_model(&self, _request: &ModelRequest) -> Result<StructuredOutput, ProviderError> {
            Ok(StructuredOutput::draft("ok"))
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    struct NamedFactory;

    impl ClientFactory for NamedFactory {
        fn provider_type(&self) -> &'static str {
            "named"
        }

        fn create(&self, config: &JsonValue) -> Result<Arc<dyn ModelClient>, ProviderError> {
            self.create_named("named", config)
        }

        fn create_named(
            &self,
            provider_id: &str,
            _config: &JsonValue,
        ) -> Result<Arc<dyn ModelClient>, ProviderError> {
            Ok(Arc::new(NamedClient {
                name: provider_id.to_string(),
            }))
        }

        fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
            if config["broken"].as_bool() == Some(true) {
                return Err(ProviderError::NotConfigured("broken".to_string()));
            }
            Ok(())
        }
    }

    fn registry() -> ClientFactoryRegistry {
        let mut registry = ClientFactoryRegistry::new();
        registry.register(Arc::new(NamedFactory));
        registry
    }

    #[test]
    fn test_create_by_provider_id() {
        let client = registry().create("named", &serde_json::json!({})).unwrap();
        assert_eq!(client.name(), "named");
    }

    #[test]
    fn test_type_field_selects_factory() {
        let config = serde_json::json!({ "type": "named" });
        let client = registry().create("custom", &config).unwrap();
        assert_eq!(client.name(), "custom");
    }

    #[test]
    fn test_unknown_type() {
        let result = registry().create("mystery", &serde_json::json!({}));
        match result {
            Err(ProviderError::NotConfigured(msg)) => {
                assert!(msg.contains("Unknown provider type"));
                assert!(msg.contains("named"));
            }
            _ => panic!("Expected NotConfigured error"),
        }
    }

    #[test]
    fn test_validate() {
        let registry = registry();
        assert!(registry.validate("named", &serde_json::json!({})).is_ok());
        assert!(registry
            .validate("named", &serde_json::json!({ "broken": true }))
            .is_err());
        assert!(registry.validate("mystery", &serde_json::json!({})).is_err());
    }

    #[test]
    fn test_available_types() {
        let mut registry = ClientFactoryRegistry::new();
        assert!(registry.available_types().is_empty());
        registry.register(Arc::new(NamedFactory));
        assert_eq!(registry.available_types(), vec!["named"]);
        assert!(registry.has_factory("named"));
    }
}
