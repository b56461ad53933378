//! Runtime configuration.
//!
//! ```yaml
//! default_provider: openai
//! call_timeout: 90s
//! normalize_rejected_without_issues: false
//! throttle:
//!   limits:
//!     openai: 5
//!     anthropic: 4
//! providers:
//!   anthropic:
//!     api_key_env: ANTHROPIC_API_KEY
//!     max_tokens: 4096
//!   deepseek:
//!     type: openai
//!     base_url: https://api.deepseek.com/v1
//! ```
//!
//! Every field is optional.

use cantor_core::{ProviderRegistry, ReviewNormalization, DEFAULT_PROVIDER};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::gateway::DEFAULT_CALL_TIMEOUT;
use crate::providers::{ClientFactoryRegistry, ClientRouter, ProviderError};
use crate::resilience::{AdaptiveThrottler, ThrottleConfig};

/// Errors from loading or validating a [`RuntimeConfig`].
#[derive(Error, Debug)]
pub enum RuntimeConfigError {
    #[error("Failed to read runtime config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse runtime config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid runtime config: {0}")]
    Invalid(String),

    #[error("Provider configuration rejected: {0}")]
    Provider(#[from] ProviderError),
}

/// Process-wide settings shared by all runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Per-provider concurrency limits
    pub throttle: ThrottleConfig,

    /// Provider for model ids no prefix rule matches
    pub default_provider: String,

    /// Per-call timeout, e.g. `120s` or `2m`
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub call_timeout: Duration,

    /// Treat `rejected` reviews without issues as approvals
    pub normalize_rejected_without_issues: bool,

    /// Provider id -> adapter configuration
    pub providers: BTreeMap<String, JsonValue>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            throttle: ThrottleConfig::default(),
            default_provider: DEFAULT_PROVIDER.to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            normalize_rejected_without_issues: false,
            providers: BTreeMap::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, RuntimeConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuntimeConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<(), RuntimeConfigError> {
        if self.default_provider.trim().is_empty() {
            return Err(RuntimeConfigError::Invalid(
                "default_provider must not be empty".to_string(),
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(RuntimeConfigError::Invalid(
                "call_timeout must be greater than zero".to_string(),
            ));
        }
        for (provider, limit) in &self.throttle.limits {
            if *limit == 0 {
                return Err(RuntimeConfigError::Invalid(format!(
                    "throttle limit for '{}' must be at least 1",
                    provider
                )));
            }
        }
        for (provider, config) in &self.providers {
            if !config.is_object() {
                return Err(RuntimeConfigError::Invalid(format!(
                    "provider '{}' configuration must be a mapping",
                    provider
                )));
            }
        }
        Ok(())
    }

    pub fn normalization(&self) -> ReviewNormalization {
        ReviewNormalization {
            approve_rejected_without_issues: self.normalize_rejected_without_issues,
        }
    }

    pub fn registry(&self) -> ProviderRegistry {
        ProviderRegistry::new(&self.default_provider)
    }

    pub fn throttler(&self) -> AdaptiveThrottler {
        AdaptiveThrottler::from_config(&self.throttle)
    }

    /// Build a client for every entry of `providers`.
    pub fn client_router(
        &self,
        factories: &ClientFactoryRegistry,
    ) -> Result<ClientRouter, RuntimeConfigError> {
        for (provider, config) in &self.providers {
            factories.validate(provider, config)?;
        }
        Ok(ClientRouter::from_config(
            self.registry(),
            factories,
            &self.providers,
        )?)
    }
}

fn serialize_duration<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RuntimeConfig::from_yaml("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.call_timeout, Duration::from_secs(120));
        assert_eq!(config.throttle.limits["google"], 8);
        assert!(!config.normalization().approve_rejected_without_issues);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
default_provider: anthropic
call_timeout: 1m 30s
normalize_rejected_without_issues: true
throttle:
  limits:
    openai: 2
providers:
  openai:
    api_key_env: MY_OPENAI_KEY
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.call_timeout, Duration::from_secs(90));
        assert_eq!(config.throttle.limits.len(), 1);
        assert_eq!(config.registry().resolve("llama-3"), "anthropic");
        assert!(config.normalization().approve_rejected_without_issues);
        assert_eq!(config.throttler().current_limit("openai"), Some(2));
        assert_eq!(config.providers["openai"]["api_key_env"], "MY_OPENAI_KEY");
    }

    #[test]
    fn test_invalid_duration() {
        assert!(matches!(
            RuntimeConfig::from_yaml("call_timeout: soon"),
            Err(RuntimeConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_zero_values_rejected() {
        assert!(matches!(
            RuntimeConfig::from_yaml("call_timeout: 0s"),
            Err(RuntimeConfigError::Invalid(_))
        ));
        assert!(matches!(
            RuntimeConfig::from_yaml("throttle:\n  limits:\n    openai: 0"),
            Err(RuntimeConfigError::Invalid(_))
        ));
        assert!(matches!(
            RuntimeConfig::from_yaml("default_provider: ''"),
            Err(RuntimeConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_provider_entry_must_be_mapping() {
        let yaml = "providers:\n  openai: sk-inline-key";
        assert!(matches!(
            RuntimeConfig::from_yaml(yaml),
            Err(RuntimeConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_duration_serializes_humanized() {
        let config = RuntimeConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("call_timeout: 2m"));
        assert_eq!(RuntimeConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_unknown_provider_type_rejected() {
        let yaml = "providers:\n  mystery:\n    type: carrier-pigeon";
        let config = RuntimeConfig::from_yaml(yaml).unwrap();
        assert!(matches!(
            config.client_router(&ClientFactoryRegistry::new()),
            Err(RuntimeConfigError::Provider(_))
        ));
    }
}
