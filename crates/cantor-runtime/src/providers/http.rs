//! HTTP plumbing shared by the reqwest-based adapters.

use serde_json::Value as JsonValue;
use std::time::Duration;

use super::ProviderError;

/// Longest API error body quoted in an error message.
const MAX_ERROR_BODY: usize = 500;

pub(crate) fn build_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| ProviderError::Internal(format!("failed to build HTTP client: {}", e)))
}

pub(crate) fn send_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Http(e.to_string())
}

/// Map non-success statuses to typed errors.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ProviderError::RateLimited { retry_after });
    }

    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(ProviderError::Auth);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Pull `error.message` out of a JSON error body, else quote the body.
fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<JsonValue>(body).ok();
    if let Some(message) = parsed
        .as_ref()
        .and_then(|v| v["error"]["message"].as_str())
    {
        return message.to_string();
    }
    body.chars().take(MAX_ERROR_BODY).collect()
}

/// Reject base URLs that are not http(s).
pub(crate) fn validate_base_url(config: &JsonValue) -> Result<(), ProviderError> {
    if let Some(url) = config["base_url"].as_str() {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ProviderError::NotConfigured(
                "base_url must start with http:// or https://".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_from_json() {
        let body = r#"{"error": {"type": "invalid_request_error", "message": "max_tokens too large"}}"#;
        assert_eq!(error_message(body), "max_tokens too large");
    }

    #[test]
    fn test_error_message_plain_text_truncated() {
        let body = "x".repeat(2000);
        assert_eq!(error_message(&body).len(), MAX_ERROR_BODY);
    }

    #[test]
    fn test_validate_base_url() {
        assert!(validate_base_url(&serde_json::json!({})).is_ok());
        assert!(validate_base_url(&serde_json::json!({ "base_url": "https://x" })).is_ok());
        assert!(validate_base_url(&serde_json::json!({ "base_url": "ftp://x" })).is_err());
    }
}
