//! Provider integrations. Each vendor module exposes a config type and an
//! [`LlmProvider`](crate::provider::LlmProvider) implementation.

pub mod gemini;
pub mod github;

use std::time::Duration;

use tracing::warn;

use crate::errors::ProviderError;
use crate::model::ProviderId;

/// Reads an environment variable, treating blank values as unset.
pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads a `Retry-After` header given in seconds.
pub(crate) fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Turns a non-success response into a classified error.
pub(crate) async fn error_from_response(
    provider: &ProviderId,
    response: reqwest::Response,
) -> ProviderError {
    let status = response.status();
    let retry_after = retry_after(response.headers());
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    warn!(provider = %provider, status = status.as_u16(), "provider rejected request");
    ProviderError::from_status(provider.clone(), status.as_u16(), &body, retry_after)
}

pub(crate) fn send_error(provider: &ProviderId, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        return ProviderError::transport(provider.clone(), format!("request timed out: {err}"));
    }
    ProviderError::transport(provider.clone(), format!("request failed: {err}"))
}
