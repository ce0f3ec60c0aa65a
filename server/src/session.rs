//! Server-side sessions
//!
//! A session is identified by an opaque random token carried in a cookie.
//! Its only state is the set of note codes whose PIN was verified in it.
//! Idle sessions expire and take their verifications with them.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::RwLock;

use crate::config::SESSION_TOKEN_LENGTH;

/// Opaque session token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    fn generate() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_TOKEN_LENGTH)
            .map(char::from)
            .collect();
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct SessionEntry {
    verified_codes: HashSet<String>,
    last_seen: DateTime<Utc>,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            verified_codes: HashSet::new(),
            last_seen: Utc::now(),
        }
    }
}

/// In-memory session store shared by all request handlers
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, SessionEntry>>>,
    idle_timeout: chrono::Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        let idle_timeout =
            chrono::Duration::from_std(idle_timeout).unwrap_or_else(|_| chrono::Duration::minutes(30));

        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout,
        }
    }

    /// Resume the session for a presented token, or start a new one.
    ///
    /// Returns the session id and whether it was newly created. Unknown and
    /// expired tokens always get a fresh id; client-chosen ids are never adopted.
    pub async fn resume(&self, token: Option<&str>) -> (SessionId, bool) {
        let now = Utc::now();
        let mut sessions = self.inner.write().await;

        if let Some(token) = token {
            if let Some(entry) = sessions.get_mut(token) {
                if now - entry.last_seen <= self.idle_timeout {
                    entry.last_seen = now;
                    return (SessionId(token.to_string()), false);
                }
                sessions.remove(token);
                tracing::debug!("Session expired, starting a new one");
            }
        }

        let timeout = self.idle_timeout;
        sessions.retain(|_, entry| now - entry.last_seen <= timeout);

        let id = SessionId::generate();
        sessions.insert(id.0.clone(), SessionEntry::new());
        (id, true)
    }

    /// Whether the note's PIN was verified in this session
    pub async fn is_verified(&self, session: &SessionId, code: &str) -> bool {
        let sessions = self.inner.read().await;
        sessions
            .get(session.as_str())
            .map(|entry| {
                Utc::now() - entry.last_seen <= self.idle_timeout
                    && entry.verified_codes.contains(code)
            })
            .unwrap_or(false)
    }

    pub async fn mark_verified(&self, session: &SessionId, code: &str) {
        let mut sessions = self.inner.write().await;
        let entry = sessions
            .entry(session.as_str().to_string())
            .or_insert_with(SessionEntry::new);
        entry.verified_codes.insert(code.to_string());
        entry.last_seen = Utc::now();
    }

    /// Drop the verification for one code in one session
    pub async fn clear_verified(&self, session: &SessionId, code: &str) {
        let mut sessions = self.inner.write().await;
        if let Some(entry) = sessions.get_mut(session.as_str()) {
            entry.verified_codes.remove(code);
        }
    }

    /// Drop the verification for a code in every session
    pub async fn revoke_code(&self, code: &str) -> usize {
        let mut sessions = self.inner.write().await;
        let mut revoked = 0;
        for entry in sessions.values_mut() {
            if entry.verified_codes.remove(code) {
                revoked += 1;
            }
        }
        if revoked > 0 {
            tracing::debug!("Revoked PIN verification for {} in {} session(s)", code, revoked);
        }
        revoked
    }

    /// End a session entirely
    pub async fn end(&self, session: &SessionId) {
        self.inner.write().await.remove(session.as_str());
    }

    /// Remove idle sessions. Returns how many were dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let timeout = self.idle_timeout;
        let mut sessions = self.inner.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| now - entry.last_seen <= timeout);
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::debug!("Cleaned up {} expired session(s)", removed);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
