//! Model provider abstractions for cantor-runtime.
//!
//! [`ModelClient`] is the single capability the gateway needs: call one
//! model and return output that already conforms to the requested
//! [`OutputSchema`]. HTTP adapters for Anthropic and OpenAI-compatible
//! APIs live behind the `anthropic` and `openai` features.
//!
//! ## Security
//!
//! All adapters use the [`secrets`] module for credential handling.
//! See [`ApiCredential`] for the recommended patterns.

use async_trait::async_trait;
use cantor_core::{OutputSchema, StructuredOutput};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

mod factory;
mod router;
pub mod secrets;
mod structured;

#[cfg(any(feature = "anthropic", feature = "openai"))]
mod http;

#[cfg(feature = "anthropic")]
mod anthropic;

#[cfg(feature = "openai")]
mod openai;

pub use factory::{ClientFactory, ClientFactoryRegistry};
pub use router::ClientRouter;
pub use secrets::{ApiCredential, CredentialSource};
pub use structured::{parse_structured, schema_instruction};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicClient, AnthropicClientFactory};

#[cfg(feature = "openai")]
pub use openai::{OpenAiCompatibleClient, OpenAiCompatibleFactory};

/// Errors from model providers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Structured output did not match schema: {0}")]
    Validation(String),

    #[error("Authentication failed")]
    Auth,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Timeouts, rate limits, server errors and transport failures.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Http(_) => true,
            ProviderError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// One structured model call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub schema: OutputSchema,
}

/// Capability to call a generative model.
///
/// Implementations must return an error on timeout, rate limiting or
/// server failure, and must either return output conforming to
/// `request.schema` or fail with [`ProviderError::Validation`].
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn call_model(&self, request: &ModelRequest) -> Result<StructuredOutput, ProviderError>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// Generation settings shared by the HTTP adapters.
///
/// Read from the same JSON object as the adapter's credentials; unknown
/// keys are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdapterOptions {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: None,
        }
    }
}

impl AdapterOptions {
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        if config.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(config.clone())
            .map_err(|e| ProviderError::NotConfigured(format!("invalid adapter options: {}", e)))
    }
}
