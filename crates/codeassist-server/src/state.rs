use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use codeassist_relay::{RateLimiter, Relay, Session, SessionValidator};

/// Cookie that carries the session token set by the sign-in flow.
pub const SESSION_COOKIE: &str = "session";

#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
    pub sessions: Arc<dyn SessionValidator>,
    pub quota: Arc<dyn RateLimiter>,
}

impl AppState {
    pub fn new(relay: Relay, sessions: Arc<dyn SessionValidator>, quota: Arc<dyn RateLimiter>) -> Self {
        Self {
            relay,
            sessions,
            quota,
        }
    }

    /// Resolves the caller's session from the `session` cookie or a bearer token.
    pub fn authenticate(&self, headers: &HeaderMap) -> Option<Session> {
        let token = session_token(headers)?;
        self.sessions.validate(&token, chrono::Utc::now())
    }
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string());
    from_cookie.or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
    })
    .filter(|token| !token.is_empty())
}
