use std::time::Duration;

use crate::errors::RelayError;
use crate::model::GenerationParams;
use crate::vendors::non_empty_env;

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Configuration for the Gemini provider client.
#[derive(Clone, Debug, PartialEq)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Base URL of the Generative Language API. Useful for proxies or test servers.
    pub base_url: String,
    pub model: String,
    pub params: GenerationParams,
    /// Connection establishment timeout. The body may stream for longer.
    pub connect_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-1.5-flash".to_string(),
            params: GenerationParams {
                temperature: 0.7,
                top_p: 0.95,
                max_output_tokens: 2048,
            },
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Builds a config from `GEMINI_API_KEY`, honouring `GEMINI_MODEL` and
    /// `GEMINI_BASE_URL` when set.
    pub fn from_env() -> Result<Self, RelayError> {
        let api_key = non_empty_env(GEMINI_API_KEY_ENV).ok_or_else(|| {
            RelayError::Configuration(format!("missing {GEMINI_API_KEY_ENV} for Gemini provider"))
        })?;
        let mut config = Self::new(api_key);
        if let Some(model) = non_empty_env("GEMINI_MODEL") {
            config.model = model;
        }
        if let Some(base_url) = non_empty_env("GEMINI_BASE_URL") {
            config.base_url = base_url;
        }
        Ok(config)
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub(crate) fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            model
        )
    }
}
