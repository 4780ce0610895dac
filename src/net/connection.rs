//! Connection identity and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count open connections for graceful shutdown
//! - Carry per-connection facts (peer address, certificate identity) to
//!   every request on the connection

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{ConnectionIdentity, Session};

/// Relaxed ordering is enough: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts open connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection. The count drops when the guard does.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        let id = ConnectionId::new();
        tracing::trace!(connection_id = %id, "Connection opened");
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every connection has closed, or `limit` has passed.
    /// Returns whether the drain completed.
    pub async fn drain(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while self.active_count() > 0 {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(open = self.active_count(), "Connections still open after drain limit");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }
}

/// Lives as long as its connection.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// Per-connection facts, attached to every request as an extension.
///
/// Clones share the guard; the connection counts as open until the
/// connection's service and every request it produced are gone.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    guard: Arc<ConnectionGuard>,
    peer_addr: Option<SocketAddr>,
    identity: ConnectionIdentity,
}

impl ConnectionInfo {
    pub fn new(guard: ConnectionGuard, peer_addr: Option<SocketAddr>, identity: ConnectionIdentity) -> Self {
        Self {
            guard: Arc::new(guard),
            peer_addr,
            identity,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.guard.id()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }

    /// Session established by the client certificate, if any.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.identity.session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn-"));
    }

    #[test]
    fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);
        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn info_clones_keep_connection_open() {
        let tracker = ConnectionTracker::new();
        let info = ConnectionInfo::new(tracker.track(), None, ConnectionIdentity::Anonymous);
        let per_request = info.clone();
        assert_eq!(per_request.id(), info.id());
        assert!(per_request.session().is_none());

        drop(info);
        assert_eq!(tracker.active_count(), 1);
        drop(per_request);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn drain_reports_timeout() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track();
        assert!(!tracker.drain(Duration::from_millis(60)).await);
        drop(guard);
        assert!(tracker.drain(Duration::from_millis(60)).await);
    }
}
