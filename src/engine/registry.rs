//! Tracking of live client connections for forced shutdown.

use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// One live client socket the engine is responsible for.
///
/// The registry owns the entry from accept to close; the handler task holds
/// only the id and the token it races against.
#[derive(Debug, Clone)]
pub struct TrackedConnection {
    pub id: u64,
    pub peer: SocketAddr,
    pub opened_at: Instant,
    pub token: CancellationToken,
}

/// Concurrent set of open client connections.
///
/// Registration happens on the accept loop before the handler task is
/// spawned, so a connection can never finish before it is tracked.
/// `close_all` cancels every token; cancelling an already-finished
/// connection is a no-op, which makes double-close harmless.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<u64, TrackedConnection>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, peer: SocketAddr) -> TrackedConnection {
        let conn = TrackedConnection {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            peer,
            opened_at: Instant::now(),
            token: CancellationToken::new(),
        };
        self.connections.insert(conn.id, conn.clone());
        conn
    }

    pub fn deregister(&self, id: u64) {
        self.connections.remove(&id);
    }

    pub fn close_all(&self) {
        let count = self.connections.len();
        for entry in self.connections.iter() {
            entry.value().token.cancel();
        }
        self.connections.clear();
        if count > 0 {
            tracing::info!(count, "Force-closed open connections");
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:9999".parse().unwrap()
    }

    #[test]
    fn register_and_deregister_track_count() {
        let registry = ConnectionRegistry::new();
        let a = registry.register(peer());
        let b = registry.register(peer());
        assert_eq!(registry.len(), 2);
        assert_ne!(a.id, b.id);

        registry.deregister(a.id);
        assert_eq!(registry.len(), 1);
        // Deregistering an unknown id is a no-op
        registry.deregister(a.id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn close_all_cancels_and_empties() {
        let registry = ConnectionRegistry::new();
        let conn = registry.register(peer());
        registry.close_all();
        assert!(registry.is_empty());
        assert!(conn.token.is_cancelled());
        // A second close_all tolerates the already-closed state
        registry.close_all();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn registration_is_safe_under_concurrency() {
        let registry = std::sync::Arc::new(ConnectionRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let conn = registry.register(peer());
                registry.deregister(conn.id);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(registry.is_empty());
    }
}
