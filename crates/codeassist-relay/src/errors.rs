use std::time::Duration;

use crate::model::ProviderId;

/// Errors returned by a provider for a single attempt, before the relay
/// decides whether to retry or to end the stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Provider signalled throttling (HTTP 429 or an equivalent body status).
    #[error("rate limited by {provider}: {message}")]
    RateLimited {
        provider: ProviderId,
        message: String,
        retry_after: Option<Duration>,
    },
    /// The provider rejected our own credential.
    #[error("authentication failed at {provider}: {message}")]
    Authentication {
        provider: ProviderId,
        message: String,
    },
    /// Any other application-level failure (bad request, server error).
    #[error("provider error ({provider}): {message}")]
    Provider {
        provider: ProviderId,
        message: String,
        status_code: Option<u16>,
    },
    /// Connection or stream I/O failed.
    #[error("transport error ({provider}): {message}")]
    Transport {
        provider: ProviderId,
        message: String,
    },
    /// Response shape could not be understood.
    #[error("protocol error ({provider}): {message}")]
    Protocol {
        provider: ProviderId,
        message: String,
    },
    /// The attempt exceeded its wall-clock budget.
    #[error("{provider} did not answer within {}s", .after.as_secs())]
    Timeout {
        provider: ProviderId,
        after: Duration,
    },
}

impl ProviderError {
    pub fn rate_limited(
        provider: impl Into<ProviderId>,
        message: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        Self::RateLimited {
            provider: provider.into(),
            message: message.into(),
            retry_after,
        }
    }

    pub fn authentication(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::Authentication {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn provider(
        provider: impl Into<ProviderId>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
        }
    }

    pub fn transport(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::Transport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn protocol(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::Protocol {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Classifies a non-success HTTP response.
    ///
    /// Gemini reports quota exhaustion as `RESOURCE_EXHAUSTED` in the body, which
    /// is treated the same as a 429 regardless of the status line.
    pub fn from_status(
        provider: impl Into<ProviderId>,
        status: u16,
        body: &str,
        retry_after: Option<Duration>,
    ) -> Self {
        let provider = provider.into();
        let message = format!("HTTP {status}: {}", body.trim());
        if status == 429 || body.contains("RESOURCE_EXHAUSTED") {
            return Self::rate_limited(provider, message, retry_after);
        }
        match status {
            401 | 403 => Self::authentication(provider, message),
            _ => Self::provider(provider, message, Some(status)),
        }
    }

    /// Only throttling is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Errors surfaced before a stream is opened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// No session, or the session has expired.
    #[error("authentication required: {0}")]
    Authentication(String),
    /// No provider has a usable credential.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Unknown command, unknown provider or missing input.
    #[error("validation error: {0}")]
    Validation(String),
    /// The caller used up their request budget.
    #[error("request quota exceeded, retry in {}s", .retry_after.as_secs().max(1))]
    QuotaExceeded { retry_after: Duration },
}

impl RelayError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
