//! Model invocation with primary/fallback failover.
//!
//! Every call goes through the [`AdaptiveThrottler`] bucket of the model's
//! provider. A failed primary call is followed by exactly one fallback
//! call; there are no further retries.
//!
//! Calls run on their own tokio task. If the caller's future is dropped
//! mid-call, the task still runs to completion so its throttle slot is
//! released and its outcome recorded.

use cantor_core::{OutputSchema, ProviderRegistry, StageModels, StructuredOutput};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::providers::{ModelClient, ModelRequest, ProviderError};
use crate::resilience::AdaptiveThrottler;

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Failure of both the primary and the fallback call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error(
        "primary model '{primary_model}' failed ({primary_error}); \
         fallback model '{fallback_model}' failed ({fallback_error})"
    )]
    BothFailed {
        primary_model: String,
        primary_error: ProviderError,
        fallback_model: String,
        fallback_error: ProviderError,
    },
}

/// System and user prompt for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Result of a successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub output: StructuredOutput,

    /// Model that produced `output`
    pub model_used: String,

    pub used_fallback: bool,
}

/// Throttled model invocation with one-shot fallback.
#[derive(Clone)]
pub struct ModelGateway {
    client: Arc<dyn ModelClient>,
    throttler: Arc<AdaptiveThrottler>,
    registry: ProviderRegistry,
    call_timeout: Duration,
}

impl ModelGateway {
    pub fn new(
        client: Arc<dyn ModelClient>,
        throttler: Arc<AdaptiveThrottler>,
        registry: ProviderRegistry,
    ) -> Self {
        Self {
            client,
            throttler,
            registry,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn throttler(&self) -> &Arc<AdaptiveThrottler> {
        &self.throttler
    }

    /// Call `models.primary`, and `models.fallback` once if that fails.
    pub async fn invoke(
        &self,
        models: &StageModels,
        prompt: &Prompt,
        schema: OutputSchema,
    ) -> Result<Invocation, GatewayError> {
        let primary_error = match self.call(&models.primary, prompt, schema).await {
            Ok(output) => {
                return Ok(Invocation {
                    output,
                    model_used: models.primary.clone(),
                    used_fallback: false,
                })
            }
            Err(e) => e,
        };

        tracing::warn!(
            primary_model = %models.primary,
            fallback_model = %models.fallback,
            error = %primary_error,
            "Primary model failed, trying fallback"
        );

        match self.call(&models.fallback, prompt, schema).await {
            Ok(output) => Ok(Invocation {
                output,
                model_used: models.fallback.clone(),
                used_fallback: true,
            }),
            Err(fallback_error) => {
                tracing::error!(
                    primary_model = %models.primary,
                    fallback_model = %models.fallback,
                    error = %fallback_error,
                    "Fallback model failed"
                );
                Err(GatewayError::BothFailed {
                    primary_model: models.primary.clone(),
                    primary_error,
                    fallback_model: models.fallback.clone(),
                    fallback_error,
                })
            }
        }
    }

    /// One throttled, time-limited call on a detached task.
    async fn call(
        &self,
        model: &str,
        prompt: &Prompt,
        schema: OutputSchema,
    ) -> Result<StructuredOutput, ProviderError> {
        let provider = self.registry.resolve(model);
        let request = ModelRequest {
            model: model.to_string(),
            system_prompt: prompt.system.clone(),
            user_prompt: prompt.user.clone(),
            schema,
        };

        let client = self.client.clone();
        let throttler = self.throttler.clone();
        let timeout = self.call_timeout;

        let task = tokio::spawn(async move {
            let client = &client;
            let request = &request;
            throttler
                .acquire_and_run(&provider, move || async move {
                    match tokio::time::timeout(timeout, client.call_model(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout(timeout)),
                    }
                })
                .await
        });

        match task.await {
            Ok(result) => result,
            Err(e) => Err(ProviderError::Internal(format!("model call task failed: {}", e))),
        }
    }
}
