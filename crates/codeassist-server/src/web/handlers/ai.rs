//! AI command endpoints

use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::header::CONNECTION;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use codeassist_relay::{CommandKind, CommandRequest, FileContext, ProviderId, RegistryDescription, RelayError};
use futures::StreamExt as _;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;

use crate::state::AppState;
use crate::web::error::ApiError;

/// JSON body of `POST /api/ai/stream`.
#[derive(Debug, Deserialize)]
pub struct StreamCommandBody {
    pub command: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub context: Option<FileContext>,
}

impl StreamCommandBody {
    fn into_request(self) -> Result<CommandRequest, RelayError> {
        let command: CommandKind = self.command.parse()?;
        let mut request = CommandRequest::new(command, self.input);
        if let Some(context) = self.context {
            request = request.with_context(context);
        }
        if let Some(provider) = self.provider.filter(|p| !p.trim().is_empty()) {
            request = request.with_provider(ProviderId::new(provider.trim().to_ascii_lowercase()));
        }
        Ok(request)
    }
}

/// Runs an AI command and streams its events as SSE.
pub async fn stream_command(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<StreamCommandBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let session = state.authenticate(&headers).ok_or_else(session_required)?;
    let Json(body) = body.map_err(|e| RelayError::Validation(e.body_text()))?;
    let request = body.into_request()?;
    let prepared = state.relay.prepare(Some(&session), request)?;
    // only requests that can actually run count against the quota
    state.quota.try_acquire(&session.user_id).into_result()?;

    let stream = prepared.spawn();
    tracing::debug!(request_id = %stream.request_id(), provider = %stream.provider(), "streaming response");

    let events = ReceiverStream::new(stream.into_receiver())
        .map(|event| Ok::<_, Infallible>(Event::default().data(event.to_json())));
    let mut response = Sse::new(events).into_response();
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    Ok(response)
}

/// Lists configured providers and the default one.
pub async fn list_providers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RegistryDescription>, ApiError> {
    state.authenticate(&headers).ok_or_else(session_required)?;
    Ok(Json(state.relay.registry().describe()))
}

fn session_required() -> RelayError {
    RelayError::Authentication("a valid session is required".into())
}
