//! Startup configuration. Read once from the environment, then injected.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::chunking::{ChunkingStrategy, DEFAULT_CHUNK_SIZE};
use crate::errors::RelayError;
use crate::model::{ProviderId, RelayOptions};
use crate::policy::RetryPolicy;
use crate::prompt::TemplateRegistry;
use crate::quota::QuotaConfig;
use crate::registry::ProviderRegistry;
use crate::relay::Relay;
use crate::vendors::gemini::{GeminiConfig, GeminiProvider};
use crate::vendors::github::{GithubModelsConfig, GithubModelsProvider};

/// Everything the relay needs at startup.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelayConfig {
    pub options: RelayOptions,
    pub quota: QuotaConfig,
    /// Applied to providers that answer in one piece.
    pub chunking: ChunkingStrategy,
    pub gemini: Option<GeminiConfig>,
    pub github: Option<GithubModelsConfig>,
    /// `AI_PROVIDER`; falls back to the first configured provider.
    pub default_provider: Option<ProviderId>,
}

impl RelayConfig {
    /// Reads provider credentials and relay tuning from the process environment.
    ///
    /// Missing credentials leave that provider unconfigured; malformed
    /// numbers are rejected.
    pub fn from_env() -> Result<Self, RelayError> {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.gemini = GeminiConfig::from_env().ok();
        let chunking = config.chunking;
        config.github = GithubModelsConfig::from_env()
            .ok()
            .map(|github| github.chunking(chunking));
        Ok(config)
    }

    /// Relay options, quota and provider choice, without credentials.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RelayError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = RetryPolicy::default();
        let retry = RetryPolicy::exponential(
            parse_or(get("RELAY_MAX_RETRIES"), "RELAY_MAX_RETRIES", defaults.max_retries)?,
            parse_or(
                get("RELAY_INITIAL_DELAY_MS"),
                "RELAY_INITIAL_DELAY_MS",
                defaults.initial_delay_ms,
            )?,
            parse_or(
                get("RELAY_BACKOFF_MULTIPLIER"),
                "RELAY_BACKOFF_MULTIPLIER",
                defaults.backoff_multiplier,
            )?,
        );
        let option_defaults = RelayOptions::default();
        let options = RelayOptions {
            retry,
            attempt_timeout: Duration::from_secs(parse_or(
                get("RELAY_ATTEMPT_TIMEOUT_SECS"),
                "RELAY_ATTEMPT_TIMEOUT_SECS",
                option_defaults.attempt_timeout.as_secs(),
            )?),
            stream_buffer_capacity: option_defaults.stream_buffer_capacity,
        };
        let chunking = ChunkingStrategy::fixed_size(parse_or(
            get("RELAY_CHUNK_SIZE"),
            "RELAY_CHUNK_SIZE",
            DEFAULT_CHUNK_SIZE,
        )?);
        let quota_defaults = QuotaConfig::default();
        let quota = QuotaConfig {
            max_requests: parse_or(
                get("RELAY_QUOTA_MAX_REQUESTS"),
                "RELAY_QUOTA_MAX_REQUESTS",
                quota_defaults.max_requests,
            )?,
            window: Duration::from_secs(parse_or(
                get("RELAY_QUOTA_WINDOW_SECS"),
                "RELAY_QUOTA_WINDOW_SECS",
                quota_defaults.window.as_secs(),
            )?),
        };
        Ok(Self {
            options,
            quota,
            chunking,
            gemini: None,
            github: None,
            default_provider: get("AI_PROVIDER").map(|v| ProviderId::new(v.to_ascii_lowercase())),
        })
    }

    /// Builds the provider registry, gemini first.
    pub fn build_registry(&self) -> Result<ProviderRegistry, RelayError> {
        let mut builder = ProviderRegistry::builder();
        if let Some(gemini) = &self.gemini {
            builder = builder.register_provider(Arc::new(GeminiProvider::new(gemini.clone())?));
        }
        if let Some(github) = &self.github {
            builder =
                builder.register_provider(Arc::new(GithubModelsProvider::new(github.clone())?));
        }
        if let Some(default) = &self.default_provider {
            builder = builder.default_provider(default.clone());
        }
        let registry = builder.build()?;
        let description = registry.describe();
        info!(
            providers = description.providers.len(),
            default = description.default.as_ref().map(ProviderId::as_str),
            "provider registry ready"
        );
        Ok(registry)
    }

    /// Builds a relay with the default command templates.
    pub fn build_relay(&self) -> Result<Relay, RelayError> {
        Ok(Relay::new(
            self.build_registry()?,
            TemplateRegistry::with_defaults()?,
            self.options.clone(),
        ))
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, RelayError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| RelayError::configuration(format!("invalid {key}={raw:?}: {e}"))),
    }
}
