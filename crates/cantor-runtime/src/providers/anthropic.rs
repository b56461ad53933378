//! Anthropic Messages API adapter.
//!
//! The schema instruction is appended to the system prompt and the reply
//! text is parsed with [`parse_structured`](super::parse_structured).
//!
//! ## Security
//!
//! The API key is held in an [`ApiCredential`] and only exposed when the
//! `x-api-key` header is set.

use async_trait::async_trait;
use cantor_core::StructuredOutput;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::{
    factory::ClientFactory,
    http,
    secrets::{ApiCredential, CredentialSource},
    structured::{parse_structured, schema_instruction},
    AdapterOptions, ModelClient, ModelRequest, ProviderError,
};

/// Environment variable name for the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Client for Claude models.
pub struct AnthropicClient {
    credential: ApiCredential,
    base_url: String,
    options: AdapterOptions,
    http: reqwest::Client,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .finish()
    }
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            credential: ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                "Anthropic API key",
            ),
            base_url: DEFAULT_BASE_URL.to_string(),
            options: AdapterOptions::default(),
            http: http::build_client()?,
        })
    }

    /// Build from a provider config object.
    ///
    /// Keys: `api_key` / `api_key_env` (default `ANTHROPIC_API_KEY`),
    /// `base_url`, `max_tokens`, `temperature`.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential =
            ApiCredential::from_config_or_env(config, ANTHROPIC_API_KEY_ENV, "Anthropic API key")?;
        http::validate_base_url(config)?;

        let base_url = config["base_url"]
            .as_str()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            credential,
            base_url,
            options: AdapterOptions::from_config(config)?,
            http: http::build_client()?,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn build_request(&self, request: &ModelRequest) -> MessagesRequest {
        MessagesRequest {
            model: request.model.clone(),
            max_tokens: self.options.max_tokens,
            system: format!(
                "{}\n\n{}",
                request.system_prompt,
                schema_instruction(request.schema)
            ),
            messages: vec![Message {
                role: "user",
                content: request.user_prompt.clone(),
            }],
            temperature: self.options.temperature,
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn call_model(&self, request: &ModelRequest) -> Result<StructuredOutput, ProviderError> {
        let body = self.build_request(request);

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(http::send_error)?;

        let response = http::check_status(response).await?;
        let reply: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Validation(format!("unreadable response: {}", e)))?;

        let text: String = reply
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect();

        parse_structured(request.schema, &text)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Builds [`AnthropicClient`]s from `providers.anthropic` config.
pub struct AnthropicClientFactory;

impl ClientFactory for AnthropicClientFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn ModelClient>, ProviderError> {
        Ok(Arc::new(AnthropicClient::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, ANTHROPIC_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "Anthropic API key required: set 'api_key' in config or {} env",
                ANTHROPIC_API_KEY_ENV
            )));
        }
        http::validate_base_url(config)?;
        AdapterOptions::from_config(config).map(|_| ())
    }

    fn description(&self) -> &'static str {
        "Anthropic Messages API"
    }
}
