use std::time::Duration;

use crate::chunking::ChunkingStrategy;
use crate::errors::RelayError;
use crate::model::GenerationParams;
use crate::vendors::non_empty_env;

pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Configuration for the GitHub Models client.
#[derive(Clone, Debug, PartialEq)]
pub struct GithubModelsConfig {
    /// Personal access token used for bearer auth.
    pub token: String,
    pub base_url: String,
    pub model: String,
    pub params: GenerationParams,
    /// Total HTTP timeout. The reply is not streamed, so this bounds the whole call.
    pub timeout: Duration,
    /// How the finished answer is cut into `data` events.
    pub chunking: ChunkingStrategy,
}

impl GithubModelsConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: "https://models.inference.ai.azure.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            params: GenerationParams {
                temperature: 0.7,
                top_p: 1.0,
                max_output_tokens: 2048,
            },
            timeout: Duration::from_secs(120),
            chunking: ChunkingStrategy::default(),
        }
    }

    /// Builds a config from `GITHUB_TOKEN`, honouring `GITHUB_MODELS_MODEL`
    /// and `GITHUB_MODELS_BASE_URL`.
    pub fn from_env() -> Result<Self, RelayError> {
        let token = non_empty_env(GITHUB_TOKEN_ENV).ok_or_else(|| {
            RelayError::Configuration(format!(
                "missing {GITHUB_TOKEN_ENV} for GitHub Models provider"
            ))
        })?;
        let mut config = Self::new(token);
        if let Some(model) = non_empty_env("GITHUB_MODELS_MODEL") {
            config.model = model;
        }
        if let Some(base_url) = non_empty_env("GITHUB_MODELS_BASE_URL") {
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

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn chunking(mut self, chunking: ChunkingStrategy) -> Self {
        self.chunking = chunking;
        self
    }

    pub(crate) fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_url() {
        let config = GithubModelsConfig::new("ghp").base_url("http://localhost:8080/");
        assert_eq!(config.completions_url(), "http://localhost:8080/chat/completions");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.params.top_p, 1.0);
        assert_eq!(config.chunking, ChunkingStrategy::FixedSize(20));
    }
}
