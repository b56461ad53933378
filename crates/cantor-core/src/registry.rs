//! Model id to provider id resolution.
//!
//! Resolution is a pure side-table lookup: clients are never tagged or
//! mutated with their provider identity.

/// Provider id used when no rule matches and none is configured.
pub const DEFAULT_PROVIDER: &str = "openai";

/// Maps model identifiers to the provider that serves them.
///
/// Rules, in order:
/// 1. prefix `claude` -> `anthropic`
/// 2. prefix `gemini` -> `google`
/// 3. prefix `gpt` -> `openai`
/// 4. contains `deepseek` -> `deepseek`
/// 5. otherwise the configured default provider
///
/// Matching is case-insensitive. Resolution never fails, so every model
/// always lands in some throttle bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRegistry {
    default_provider: String,
}

impl ProviderRegistry {
    /// Create a registry with the given fallback provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        let default_provider = default_provider.into().trim().to_lowercase();
        Self {
            default_provider: if default_provider.is_empty() {
                DEFAULT_PROVIDER.to_string()
            } else {
                default_provider
            },
        }
    }

    /// Resolve the provider id for a model id.
    ///
    /// Matching ignores case and surrounding whitespace.
    pub fn resolve(&self, model_id: &str) -> String {
        let model = model_id.trim().to_lowercase();

        if model.starts_with("claude") {
            "anthropic".to_string()
        } else if model.starts_with("gemini") {
            "google".to_string()
        } else if model.starts_with("gpt") {
            "openai".to_string()
        } else if model.contains("deepseek") {
            "deepseek".to_string()
        } else {
            self.default_provider.clone()
        }
    }

    /// The provider returned when no rule matches.
    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_PROVIDER)
    }
}
