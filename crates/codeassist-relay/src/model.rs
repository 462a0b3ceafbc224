use std::fmt;
use std::time::Duration;

use crate::command::CommandKind;
use crate::policy::RetryPolicy;

/// Temperature used for `fix`, whatever the provider default is.
pub const FIX_TEMPERATURE: f32 = 0.2;

/// Stable identifier for a provider implementation (for example `gemini`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ProviderId(pub String);

impl ProviderId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProviderId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Sampling parameters sent with every completion request.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            max_output_tokens: 2048,
        }
    }
}

impl GenerationParams {
    /// Returns the parameters to use for `command`.
    ///
    /// `fix` is pinned to [`FIX_TEMPERATURE`]; every other command keeps the
    /// provider default.
    pub fn for_command(self, command: CommandKind) -> Self {
        match command {
            CommandKind::Fix => Self {
                temperature: FIX_TEMPERATURE,
                ..self
            },
            _ => self,
        }
    }
}

/// Relay behaviour shared by every request.
#[derive(Clone, Debug, PartialEq)]
pub struct RelayOptions {
    /// Retry/backoff applied to rate-limited attempts.
    pub retry: RetryPolicy,
    /// Wall-clock ceiling for a single provider attempt.
    pub attempt_timeout: Duration,
    /// Bounded event buffer between the relay task and the consumer.
    pub stream_buffer_capacity: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(60),
            stream_buffer_capacity: 64,
        }
    }
}
