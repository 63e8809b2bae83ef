// SPDX-License-Identifier: PMPL-1.0-or-later
//
//! Server-side cookie sessions.
//!
//! A session maps a random id (held in an HttpOnly cookie) to a user id and
//! nothing else — in particular, never the role. Privileged checks re-read
//! the role from the store on every call, so a revocation takes effect on
//! the very next request.
//!
//! Entries carry a creation timestamp and expire after the same lifetime as
//! the cookie: stale entries are dropped on lookup, and `create` sweeps the
//! whole map so an idle server does not accumulate dead sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use rand::RngCore;

use crate::cookies::cookie_value;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "aeris_sid";

/// Session lifetime in seconds: 24 hours, for both the cookie and the
/// server-side entry.
pub const SESSION_MAX_AGE: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy)]
struct Session {
    user_id: u64,
    created_at: Instant,
}

/// In-memory session registry.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(SESSION_MAX_AGE as u64))
    }

    fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Start a session for a user, returning the new session id. Expired
    /// entries are swept here, off the hot lookup path.
    pub fn create(&self, user_id: u64) -> String {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let id = hex::encode(bytes);

        let mut sessions = self.sessions.lock().expect("session store lock");
        sessions.retain(|_, session| session.created_at.elapsed() < self.ttl);
        sessions.insert(
            id.clone(),
            Session {
                user_id,
                created_at: Instant::now(),
            },
        );
        id
    }

    /// Resolve a session id to its user id. An expired entry reads as
    /// absent and is removed.
    pub fn resolve(&self, session_id: &str) -> Option<u64> {
        let mut sessions = self.sessions.lock().expect("session store lock");
        match sessions.get(session_id) {
            Some(session) if session.created_at.elapsed() < self.ttl => Some(session.user_id),
            Some(_) => {
                sessions.remove(session_id);
                None
            }
            None => None,
        }
    }

    /// Destroy a session. Returns whether it existed.
    pub fn destroy(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock().expect("session store lock");
        sessions.remove(session_id).is_some()
    }

    /// Resolve the acting user from the request's session cookie. This is
    /// the only source of identity: client-supplied body fields are never
    /// consulted.
    pub fn user_from_headers(&self, headers: &HeaderMap) -> Option<u64> {
        let session_id = cookie_value(headers, SESSION_COOKIE)?;
        self.resolve(&session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;
    use axum::http::HeaderValue;

    #[test]
    fn create_resolve_destroy() {
        let store = SessionStore::new();
        let sid = store.create(42);
        assert_eq!(store.resolve(&sid), Some(42));
        assert!(store.destroy(&sid));
        assert_eq!(store.resolve(&sid), None);
        assert!(!store.destroy(&sid));
    }

    #[test]
    fn session_ids_are_unique() {
        let store = SessionStore::new();
        assert_ne!(store.create(1), store.create(1));
    }

    #[test]
    fn resolves_user_from_cookie_header() {
        let store = SessionStore::new();
        let sid = store.create(7);

        let mut headers = HeaderMap::new();
        let cookie = format!("{SESSION_COOKIE}={sid}");
        headers.insert(COOKIE, HeaderValue::from_str(&cookie).unwrap());
        assert_eq!(store.user_from_headers(&headers), Some(7));

        headers.insert(COOKIE, HeaderValue::from_static("aeris_sid=bogus"));
        assert_eq!(store.user_from_headers(&headers), None);
    }

    #[test]
    fn expired_sessions_read_as_absent() {
        let store = SessionStore::with_ttl(Duration::ZERO);
        let sid = store.create(42);
        assert_eq!(store.resolve(&sid), None);
        // The expired entry was removed, not just hidden.
        assert!(!store.destroy(&sid));
    }

    #[test]
    fn create_sweeps_expired_entries() {
        let store = SessionStore::with_ttl(Duration::ZERO);
        let stale = store.create(1);
        let _fresh = store.create(2);
        // The sweep in the second create dropped the first entry.
        assert!(!store.destroy(&stale));
    }
}
