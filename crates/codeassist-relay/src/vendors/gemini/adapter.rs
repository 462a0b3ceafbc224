use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::errors::{ProviderError, RelayError};
use crate::model::{GenerationParams, ProviderId};
use crate::provider::{LlmProvider, ProviderReply, ProviderRequest};
use crate::sse::SseDecoder;
use crate::vendors::{error_from_response, send_error};

use super::GEMINI_PROVIDER;
use super::config::GeminiConfig;
use super::transport::frame_to_fragments;

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Provider for Google Gemini's streaming content API.
pub struct GeminiProvider {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, RelayError> {
        if config.api_key.trim().is_empty() {
            return Err(RelayError::configuration(
                "Gemini api_key must not be empty",
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| RelayError::configuration(format!("failed to build Gemini client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl LlmProvider for GeminiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(GEMINI_PROVIDER)
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    fn generation_params(&self) -> GenerationParams {
        self.config.params
    }

    async fn complete(&self, req: ProviderRequest) -> Result<ProviderReply, ProviderError> {
        let provider_id = self.id();
        let body = build_request_body(&req);
        debug!(request_id = %req.request_id, model = %req.model, "starting Gemini content stream");

        let response = self
            .client
            .post(self.config.stream_url(&req.model))
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(&provider_id, e))?;
        if !response.status().is_success() {
            return Err(error_from_response(&provider_id, response).await);
        }

        let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
        Ok(ProviderReply::Stream(Box::pin(fragment_stream(
            provider_id,
            bytes_stream,
        ))))
    }
}

pub(crate) fn build_request_body(req: &ProviderRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": req.prompt.user }],
        }],
        "generationConfig": {
            "temperature": req.params.temperature,
            "topP": req.params.top_p,
            "maxOutputTokens": req.params.max_output_tokens,
        },
    });
    let system = req.prompt.system.trim();
    if !system.is_empty() {
        body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system }] });
    }
    body
}

fn fragment_stream(
    provider_id: ProviderId,
    bytes_stream: ByteStream,
) -> impl futures::Stream<Item = Result<String, ProviderError>> + Send {
    struct State {
        provider_id: ProviderId,
        bytes_stream: ByteStream,
        decoder: SseDecoder,
        pending: VecDeque<String>,
        done: bool,
    }

    stream::try_unfold(
        State {
            provider_id,
            bytes_stream,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(fragment) = state.pending.pop_front() {
                    return Ok(Some((fragment, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        for frame in state.decoder.push_chunk(&chunk) {
                            state
                                .pending
                                .extend(frame_to_fragments(&state.provider_id, &frame)?);
                        }
                    }
                    Some(Err(e)) => {
                        return Err(ProviderError::transport(
                            state.provider_id,
                            format!("Gemini stream read failed: {e}"),
                        ));
                    }
                    None => {
                        if let Some(frame) = state.decoder.finish() {
                            state
                                .pending
                                .extend(frame_to_fragments(&state.provider_id, &frame)?);
                        }
                        state.done = true;
                    }
                }
            }
        },
    )
}
