//! Authenticated sessions.
//!
//! # Responsibilities
//! - Represent an authenticated identity bound to a transport or token
//! - Store token sessions and look them up by credential
//! - Expire idle token sessions
//!
//! # Design Decisions
//! - Sessions are shared via `Arc`; a mutual TLS session lives as long as
//!   its connection or the longest in-flight request using it
//! - Mutual TLS sessions are connection-owned and never enter the token map
//! - Expiry is applied lazily on lookup

use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of generated session tokens (~119 bits of entropy).
pub const SESSION_TOKEN_LEN: usize = 20;
const SESSION_ID_LEN: usize = 10;

/// How a session was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    /// Token issued by the session service.
    Session,
    /// Derived from a verified client certificate.
    MutualTls,
}

/// An authenticated identity.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub token: String,
    pub username: String,
    pub client_ip: Option<IpAddr>,
    pub session_type: SessionType,
    pub created: Instant,
    last_used: Mutex<Instant>,
}

impl Session {
    /// Build a session with fresh random id and token.
    pub fn new(username: impl Into<String>, client_ip: Option<IpAddr>, session_type: SessionType) -> Self {
        let now = Instant::now();
        Self {
            id: random_id(SESSION_ID_LEN),
            token: random_id(SESSION_TOKEN_LEN),
            username: username.into(),
            client_ip,
            session_type,
            created: now,
            last_used: Mutex::new(now),
        }
    }

    /// Mark the session as used now.
    pub fn touch(&self) {
        if let Ok(mut last) = self.last_used.lock() {
            *last = Instant::now();
        }
    }

    /// Time since the session was last used.
    pub fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }
}

/// Capability to find a session from a presented credential.
pub trait SessionLookup: Send + Sync {
    /// Returns the session for `token`, or `None` if unknown or expired.
    fn lookup_token(&self, token: &str) -> Option<Arc<Session>>;
}

/// In-memory token session store.
#[derive(Debug)]
pub struct SessionStore {
    by_token: DashMap<String, Arc<Session>>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            by_token: DashMap::new(),
            timeout,
        }
    }

    /// Create and store a token session.
    pub fn create_session(&self, username: &str, client_ip: Option<IpAddr>) -> Arc<Session> {
        let session = Arc::new(Session::new(username, client_ip, SessionType::Session));
        self.by_token.insert(session.token.clone(), session.clone());
        tracing::info!(session_id = %session.id, username = %username, "Session created");
        session
    }

    /// Find a session by its public id.
    pub fn get_by_id(&self, id: &str) -> Option<Arc<Session>> {
        self.apply_timeouts();
        self.by_token
            .iter()
            .find(|entry| entry.value().id == id)
            .map(|entry| entry.value().clone())
    }

    /// Remove a session; returns whether it existed.
    pub fn remove(&self, session: &Session) -> bool {
        let removed = self.by_token.remove(&session.token).is_some();
        if removed {
            tracing::info!(session_id = %session.id, "Session removed");
        }
        removed
    }

    /// Drop every session idle longer than the timeout.
    pub fn apply_timeouts(&self) {
        let timeout = self.timeout;
        self.by_token.retain(|_, session| {
            let keep = session.idle_for() < timeout;
            if !keep {
                tracing::info!(session_id = %session.id, "Session expired");
            }
            keep
        });
    }

    /// Ids of every live session.
    pub fn ids(&self) -> Vec<String> {
        self.apply_timeouts();
        let mut ids: Vec<String> = self.by_token.iter().map(|e| e.value().id.clone()).collect();
        ids.sort();
        ids
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}

impl SessionLookup for SessionStore {
    fn lookup_token(&self, token: &str) -> Option<Arc<Session>> {
        if token.len() != SESSION_TOKEN_LEN {
            return None;
        }
        self.apply_timeouts();
        let session = self.by_token.get(token)?.value().clone();
        session.touch();
        Some(session)
    }
}

fn random_id(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
