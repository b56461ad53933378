//! OpenAI-compatible Chat Completions adapter.
//!
//! Serves OpenAI itself, DeepSeek, Google's OpenAI-compatible Gemini
//! endpoint and any other service speaking the same protocol at a custom
//! `base_url`. JSON mode is requested through `response_format`.

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

/// Client for one OpenAI-compatible endpoint.
pub struct OpenAiCompatibleClient {
    provider: String,
    credential: ApiCredential,
    base_url: String,
    options: AdapterOptions,
    http: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("provider", &self.provider)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiCompatibleClient {
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            provider: provider.into(),
            credential: ApiCredential::new(api_key, CredentialSource::Programmatic, "API key"),
            base_url: base_url.into(),
            options: AdapterOptions::default(),
            http: http::build_client()?,
        })
    }

    fn build_request(&self, request: &ModelRequest) -> ChatRequest {
        ChatRequest {
            model: request.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: format!(
                        "{}\n\n{}",
                        request.system_prompt,
                        schema_instruction(request.schema)
                    ),
                },
                ChatMessage {
                    role: "user",
                    content: request.user_prompt.clone(),
                },
            ],
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    async fn call_model(&self, request: &ModelRequest) -> Result<StructuredOutput, ProviderError> {
        let body = self.build_request(request);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(http::send_error)?;

        let response = http::check_status(response).await?;
        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Validation(format!("unreadable response: {}", e)))?;

        let text = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Validation("response has no message content".to_string()))?;

        parse_structured(request.schema, &text)
    }

    fn name(&self) -> &str {
        &self.provider
    }
}

/// Builds [`OpenAiCompatibleClient`]s for one provider id.
///
/// ```json
/// { "api_key_env": "DEEPSEEK_API_KEY", "base_url": "https://api.deepseek.com/v1" }
/// ```
pub struct OpenAiCompatibleFactory {
    provider_type: &'static str,
    default_base_url: &'static str,
    default_env: &'static str,
    key_name: &'static str,
}

impl OpenAiCompatibleFactory {
    pub fn openai() -> Self {
        Self {
            provider_type: "openai",
            default_base_url: "https://api.openai.com/v1",
            default_env: "OPENAI_API_KEY",
            key_name: "OpenAI API key",
        }
    }

    pub fn deepseek() -> Self {
        Self {
            provider_type: "deepseek",
            default_base_url: "https://api.deepseek.com/v1",
            default_env: "DEEPSEEK_API_KEY",
            key_name: "DeepSeek API key",
        }
    }

    pub fn google() -> Self {
        Self {
            provider_type: "google",
            default_base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
            default_env: "GOOGLE_API_KEY",
            key_name: "Google API key",
        }
    }

    /// Build a client for `provider` from its config object.
    pub fn build(
        &self,
        provider: &str,
        config: &JsonValue,
    ) -> Result<OpenAiCompatibleClient, ProviderError> {
        let credential = ApiCredential::from_config_or_env(config, self.default_env, self.key_name)?;
        http::validate_base_url(config)?;

        let base_url = config["base_url"]
            .as_str()
            .unwrap_or(self.default_base_url)
            .trim_end_matches('/')
            .to_string();

        Ok(OpenAiCompatibleClient {
            provider: provider.to_string(),
            credential,
            base_url,
            options: AdapterOptions::from_config(config)?,
            http: http::build_client()?,
        })
    }
}

impl ClientFactory for OpenAiCompatibleFactory {
    fn provider_type(&self) -> &'static str {
        self.provider_type
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn ModelClient>, ProviderError> {
        Ok(Arc::new(self.build(self.provider_type, config)?))
    }

    fn create_named(
        &self,
        provider_id: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn ModelClient>, ProviderError> {
        Ok(Arc::new(self.build(provider_id, config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, self.default_env) {
            return Err(ProviderError::NotConfigured(format!(
                "{} required: set 'api_key' in config or {} env",
                self.key_name, self.default_env
            )));
        }
        http::validate_base_url(config)?;
        AdapterOptions::from_config(config).map(|_| ())
    }

    fn description(&self) -> &'static str {
        "OpenAI-compatible Chat Completions API"
    }
}
