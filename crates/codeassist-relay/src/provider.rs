use std::pin::Pin;

use crate::chunking::ChunkingStrategy;
use crate::errors::ProviderError;
use crate::model::{GenerationParams, ProviderId};
use crate::prompt::Prompt;

/// Live sequence of text fragments produced by a provider.
pub type FragmentStream =
    Pin<Box<dyn futures::Stream<Item = Result<String, ProviderError>> + Send + 'static>>;

/// Everything a provider needs for one attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderRequest {
    pub request_id: uuid::Uuid,
    pub model: String,
    pub prompt: Prompt,
    pub params: GenerationParams,
}

/// What a provider hands back once the call has been accepted.
pub enum ProviderReply {
    /// Tokens arrive incrementally.
    Stream(FragmentStream),
    /// The provider only returns the finished answer.
    Complete(String),
}

impl std::fmt::Debug for ProviderReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("ProviderReply::Stream(..)"),
            Self::Complete(text) => f.debug_tuple("ProviderReply::Complete").field(text).finish(),
        }
    }
}

/// One LLM backend. The relay wraps every implementation in the same
/// retry/backoff loop.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Model used when the request does not name one.
    fn default_model(&self) -> &str;

    /// Default sampling parameters for this provider.
    fn generation_params(&self) -> GenerationParams;

    /// How a `ProviderReply::Complete` answer is cut into events.
    fn chunking(&self) -> ChunkingStrategy {
        ChunkingStrategy::default()
    }

    /// Sends the prompt. Errors returned here happen before any output.
    async fn complete(&self, req: ProviderRequest) -> Result<ProviderReply, ProviderError>;
}
