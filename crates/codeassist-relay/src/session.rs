use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

/// A signed-in user, keyed by the opaque session token the browser holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    /// Credential for the user's own upstream account. Never sent to LLM providers.
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        access_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Resolves a raw session token to a live session.
pub trait SessionValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Option<Session>;
}

/// In-process session table.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: impl Into<String>, session: Session) {
        self.sessions.insert(token.into(), session);
    }

    pub fn remove(&self, token: &str) -> Option<Session> {
        self.sessions.remove(token).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops every session that has expired by `now`, presented or not.
    pub fn prune(&self, now: DateTime<Utc>) {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!(removed, "pruned expired sessions");
        }
    }
}

impl SessionValidator for MemorySessionStore {
    /// Expired sessions are dropped on sight.
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Option<Session> {
        if token.trim().is_empty() {
            return None;
        }
        let session = self.sessions.get(token).map(|entry| entry.value().clone())?;
        if session.is_expired(now) {
            debug!(user_id = %session.user_id, "session expired");
            self.sessions.remove_if(token, |_, s| s.is_expired(now));
            return None;
        }
        Some(session)
    }
}
