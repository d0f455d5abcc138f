//! Viewer authentication: one configured admin identity, cookie-backed
//! server-side sessions with a fixed TTL.

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "meshboard_session";
const SESSION_TIMEOUT_HOURS: i64 = 24;

/// The single principal allowed to use the console. Credentials come from
/// configuration (or environment), never from source.
pub struct Identity {
    username: String,
    password_hash: String,
}

impl Identity {
    pub fn new(username: &str, password_hash: &str) -> Self {
        Self {
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        }
    }

    /// Constant capability check: does this username/password pair belong to
    /// the configured admin? An empty configured hash rejects everything.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        if username != self.username || self.password_hash.is_empty() {
            return false;
        }
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }

    pub fn has_credential(&self) -> bool {
        !self.password_hash.is_empty()
    }
}

#[derive(Clone, Debug)]
struct Session {
    token: String,
    created_at: DateTime<Utc>,
    username: String,
}

/// In-memory session store. Expired sessions are pruned whenever a new one
/// is created; process restart logs everyone out.
pub struct SessionStore {
    sessions: RwLock<Vec<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(Vec::new()),
        }
    }

    pub fn create(&self, username: &str) -> String {
        let token = Uuid::new_v4().to_string();
        let session = Session {
            token: token.clone(),
            created_at: Utc::now(),
            username: username.to_string(),
        };

        let mut sessions = self.sessions.write();
        let cutoff = Utc::now() - Duration::hours(SESSION_TIMEOUT_HOURS);
        sessions.retain(|s| s.created_at > cutoff);
        sessions.push(session);

        token
    }

    /// Returns the session's username when the token is known and unexpired.
    pub fn validate(&self, token: &str) -> Option<String> {
        let sessions = self.sessions.read();
        let cutoff = Utc::now() - Duration::hours(SESSION_TIMEOUT_HOURS);
        sessions
            .iter()
            .find(|s| s.token == token && s.created_at > cutoff)
            .map(|s| s.username.clone())
    }

    pub fn remove(&self, token: &str) {
        self.sessions.write().retain(|s| s.token != token);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Pulls the session token out of the request's Cookie header.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            (name == SESSION_COOKIE).then(|| value.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn created_session_validates_and_removes() {
        let store = SessionStore::new();
        let token = store.create("admin");
        assert_eq!(store.validate(&token).as_deref(), Some("admin"));

        store.remove(&token);
        assert!(store.validate(&token).is_none());
    }

    #[test]
    fn unknown_token_is_rejected() {
        let store = SessionStore::new();
        store.create("admin");
        assert!(store.validate("not-a-token").is_none());
    }

    #[test]
    fn cookie_header_parsing_finds_our_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; meshboard_session=abc123; lang=en"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc123"));

        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark"));
        assert!(token_from_headers(&headers).is_none());
    }

    #[test]
    fn identity_with_empty_hash_rejects_all() {
        let identity = Identity::new("admin", "");
        assert!(!identity.verify("admin", "password"));
        assert!(!identity.has_credential());
    }

    #[test]
    fn identity_verifies_matching_credentials() {
        let hash = bcrypt::hash("hunter2", 4).unwrap();
        let identity = Identity::new("admin", &hash);
        assert!(identity.verify("admin", "hunter2"));
        assert!(!identity.verify("admin", "wrong"));
        assert!(!identity.verify("root", "hunter2"));
    }
}
