//! Credential handling for model providers.
//!
//! API keys are wrapped in [`secrecy::SecretString`] as soon as they are
//! read. They redact in `Debug` and `Display` and are only exposed at the
//! point where a request header is set.
//!
//! ```ignore
//! let cred = ApiCredential::from_config_or_env(&config, "ANTHROPIC_API_KEY", "Anthropic API key")?;
//! request.header("x-api-key", cred.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Config key holding an inline key.
pub const API_KEY_FIELD: &str = "api_key";

/// Config key naming a non-default environment variable.
pub const API_KEY_ENV_FIELD: &str = "api_key_env";

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Config,
    Environment,
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// An API key that never shows up in logs.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load from an environment variable.
    pub fn from_env(env_var: &str, name: &'static str) -> Result<Self, ProviderError> {
        match std::env::var(env_var) {
            Ok(value) if !value.trim().is_empty() => {
                Ok(Self::new(value, CredentialSource::Environment, name))
            }
            _ => Err(ProviderError::NotConfigured(format!(
                "{} not set: configure '{}' environment variable",
                name, env_var
            ))),
        }
    }

    /// Load from a provider config object, falling back to the environment.
    ///
    /// Lookup order:
    /// 1. inline `api_key`
    /// 2. the variable named by `api_key_env`
    /// 3. `default_env`
    pub fn from_config_or_env(
        config: &JsonValue,
        default_env: &str,
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = config[API_KEY_FIELD].as_str() {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        let env_var = config[API_KEY_ENV_FIELD].as_str().unwrap_or(default_env);
        Self::from_env(env_var, name).map_err(|_| {
            ProviderError::NotConfigured(format!(
                "{} required: set '{}' in config or {} environment variable",
                name, API_KEY_FIELD, env_var
            ))
        })
    }

    /// Whether a credential could be loaded, without loading it.
    pub fn is_available(config: &JsonValue, default_env: &str) -> bool {
        if config[API_KEY_FIELD].as_str().is_some() {
            return true;
        }
        let env_var = config[API_KEY_ENV_FIELD].as_str().unwrap_or(default_env);
        std::env::var(env_var).map(|v| !v.trim().is_empty()).unwrap_or(false)
    }

    /// The raw key. Call only where the request header is built.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "sk-cantor-secret-key-12345";

    #[test]
    fn test_credential_redacted() {
        let cred = ApiCredential::new(SECRET, CredentialSource::Config, "Test API key");

        let debug = format!("{:?}", cred);
        assert!(!debug.contains(SECRET));
        assert!(debug.contains("[REDACTED]"));

        let display = format!("{}", cred);
        assert!(!display.contains(SECRET));
        assert!(display.contains("Test API key from config"));
    }

    #[test]
    fn test_expose_returns_value() {
        let cred = ApiCredential::new(SECRET, CredentialSource::Programmatic, "Test API key");
        assert_eq!(cred.expose(), SECRET);
        assert!(!cred.is_empty());
    }

    #[test]
    fn test_inline_key_wins() {
        std::env::set_var("CANTOR_TEST_KEY_INLINE", "env-key");
        let config = serde_json::json!({ "api_key": "config-key" });
        let cred =
            ApiCredential::from_config_or_env(&config, "CANTOR_TEST_KEY_INLINE", "Test").unwrap();
        assert_eq!(cred.expose(), "config-key");
        assert_eq!(cred.source(), CredentialSource::Config);
        std::env::remove_var("CANTOR_TEST_KEY_INLINE");
    }

    #[test]
    fn test_custom_env_var() {
        std::env::set_var("CANTOR_TEST_KEY_CUSTOM", "custom-key");
        let config = serde_json::json!({ "api_key_env": "CANTOR_TEST_KEY_CUSTOM" });
        let cred = ApiCredential::from_config_or_env(&config, "CANTOR_TEST_UNUSED", "Test").unwrap();
        assert_eq!(cred.expose(), "custom-key");
        assert_eq!(cred.source(), CredentialSource::Environment);
        std::env::remove_var("CANTOR_TEST_KEY_CUSTOM");
    }

    #[test]
    fn test_missing_credential_names_sources() {
        let config = serde_json::json!({});
        let err =
            ApiCredential::from_config_or_env(&config, "CANTOR_TEST_KEY_MISSING_987", "Test key")
                .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Test key"));
        assert!(message.contains("api_key"));
        assert!(message.contains("CANTOR_TEST_KEY_MISSING_987"));
    }

    #[test]
    fn test_is_available() {
        assert!(ApiCredential::is_available(
            &serde_json::json!({ "api_key": "value" }),
            "CANTOR_TEST_NOPE"
        ));
        assert!(!ApiCredential::is_available(
            &serde_json::json!({}),
            "CANTOR_TEST_NOPE"
        ));
    }
}
