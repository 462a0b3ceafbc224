use serde::Deserialize;
use tracing::debug;

use crate::chunking::ChunkingStrategy;
use crate::errors::{ProviderError, RelayError};
use crate::model::{GenerationParams, ProviderId};
use crate::provider::{LlmProvider, ProviderReply, ProviderRequest};
use crate::vendors::{error_from_response, send_error};

use super::GITHUB_PROVIDER;
use super::config::GithubModelsConfig;

/// Provider for GitHub Models. Answers arrive complete and are chunked by the relay.
pub struct GithubModelsProvider {
    client: reqwest::Client,
    config: GithubModelsConfig,
}

impl GithubModelsProvider {
    pub fn new(config: GithubModelsConfig) -> Result<Self, RelayError> {
        if config.token.trim().is_empty() {
            return Err(RelayError::configuration(
                "GitHub Models token must not be empty",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                RelayError::configuration(format!("failed to build GitHub Models client: {e}"))
            })?;
        Ok(Self { client, config })
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait::async_trait]
impl LlmProvider for GithubModelsProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(GITHUB_PROVIDER)
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    fn generation_params(&self) -> GenerationParams {
        self.config.params
    }

    fn chunking(&self) -> ChunkingStrategy {
        self.config.chunking
    }

    async fn complete(&self, req: ProviderRequest) -> Result<ProviderReply, ProviderError> {
        let provider_id = self.id();
        debug!(request_id = %req.request_id, model = %req.model, "requesting GitHub Models completion");

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.token)
            .json(&build_request_body(&req))
            .send()
            .await
            .map_err(|e| send_error(&provider_id, e))?;
        if !response.status().is_success() {
            return Err(error_from_response(&provider_id, response).await);
        }

        let completion: ChatCompletion = response.json().await.map_err(|e| {
            ProviderError::protocol(provider_id.clone(), format!("invalid completion body: {e}"))
        })?;
        let text = completion
            .choices
            .into_iter()
            .find_map(|c| c.message.and_then(|m| m.content))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::protocol(provider_id, "completion contained no text"))?;
        Ok(ProviderReply::Complete(text))
    }
}

pub(crate) fn build_request_body(req: &ProviderRequest) -> serde_json::Value {
    let mut messages = Vec::with_capacity(2);
    let system = req.prompt.system.trim();
    if !system.is_empty() {
        messages.push(serde_json::json!({ "role": "system", "content": system }));
    }
    messages.push(serde_json::json!({ "role": "user", "content": req.prompt.user }));

    serde_json::json!({
        "model": req.model,
        "messages": messages,
        "temperature": req.params.temperature,
        "top_p": req.params.top_p,
        "max_tokens": req.params.max_output_tokens,
        "stream": false,
    })
}
