use serde::Deserialize;
use tracing::warn;

use crate::errors::ProviderError;
use crate::model::ProviderId;
use crate::sse::SseFrame;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize, Debug)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Extracts text fragments from one SSE frame.
///
/// Undecodable payloads are logged and skipped; an in-band `error` object
/// ends the stream.
pub(crate) fn frame_to_fragments(
    provider: &ProviderId,
    frame: &SseFrame,
) -> Result<Vec<String>, ProviderError> {
    if frame.is_sentinel() {
        return Ok(Vec::new());
    }
    let chunk: StreamChunk = match serde_json::from_str(&frame.data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(provider = %provider, error = %e, bytes = frame.data.len(), "skipping malformed stream payload");
            return Ok(Vec::new());
        }
    };

    if let Some(err) = chunk.error {
        let body = format!("{}: {}", err.status, err.message);
        return Err(ProviderError::from_status(
            provider.clone(),
            err.code.unwrap_or(500),
            &body,
            None,
        ));
    }

    let mut fragments = Vec::new();
    for candidate in chunk.candidates {
        if let Some(reason) = candidate.finish_reason.as_deref()
            && matches!(reason, "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT")
        {
            return Err(ProviderError::provider(
                provider.clone(),
                format!("response blocked by provider ({reason})"),
                None,
            ));
        }
        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        fragments.extend(
            parts
                .into_iter()
                .filter_map(|p| p.text)
                .filter(|t| !t.is_empty()),
        );
    }
    Ok(fragments)
}
