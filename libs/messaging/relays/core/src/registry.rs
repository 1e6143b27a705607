//! # Client Registry
//!
//! Concurrency-safe set of currently open connections, keyed by connection id.
//!
//! All three operations take the same lock, so `add`, `remove` and `snapshot`
//! are serialized: a snapshot either sees a connection fully open or not at
//! all. The lock is never held across I/O or an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::gauge;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::connection::{ConnectionId, ConnectionState, RemoteClientConnection};

/// Set of open client connections
#[derive(Default)]
pub struct ClientRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<RemoteClientConnection>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection that has finished its handshake and mark it
    /// `Open`. Returns `false` (and changes nothing) if it is already present
    /// or no longer in `Connecting` state.
    pub fn add(&self, connection: Arc<RemoteClientConnection>) -> bool {
        let mut conns = self.connections.write();
        if conns.contains_key(&connection.id()) {
            return false;
        }
        if !connection.transition(ConnectionState::Connecting, ConnectionState::Open) {
            debug!(
                "Refusing to register connection {} in state {}",
                connection.id(),
                connection.state()
            );
            return false;
        }

        let id = connection.id();
        let peer = connection.peer();
        conns.insert(id, connection);
        gauge!("relay_open_connections").set(conns.len() as f64);
        info!(
            "Added client {} ({}), total connections: {}",
            id,
            peer,
            conns.len()
        );
        true
    }

    /// Deregister a connection and mark it `Closing`. No-op if absent.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<RemoteClientConnection>> {
        let mut conns = self.connections.write();
        let removed = conns.remove(id)?;
        removed.transition(ConnectionState::Open, ConnectionState::Closing);
        gauge!("relay_open_connections").set(conns.len() as f64);
        info!("Removed client {}, total connections: {}", id, conns.len());
        Some(removed)
    }

    /// Point-in-time list of open connections
    pub fn snapshot(&self) -> Vec<Arc<RemoteClientConnection>> {
        self.connections
            .read()
            .values()
            .filter(|conn| conn.is_open())
            .cloned()
            .collect()
    }

    /// Deregister everything, marking each connection `Closing`
    pub fn drain(&self) -> Vec<Arc<RemoteClientConnection>> {
        let mut conns = self.connections.write();
        let drained: Vec<_> = conns.drain().map(|(_, conn)| conn).collect();
        for conn in &drained {
            conn.transition(ConnectionState::Open, ConnectionState::Closing);
        }
        gauge!("relay_open_connections").set(0.0);
        drained
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn make_connection() -> Arc<RemoteClientConnection> {
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let (conn, _rx) = RemoteClientConnection::new(peer, 8);
        Arc::new(conn)
    }

    #[test]
    fn test_add_marks_open() {
        let registry = ClientRegistry::new();
        let conn = make_connection();
        assert!(registry.add(conn.clone()));
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&conn.id()));
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let registry = ClientRegistry::new();
        let conn = make_connection();
        assert!(registry.add(conn.clone()));
        assert!(!registry.add(conn.clone()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_marks_closing() {
        let registry = ClientRegistry::new();
        let conn = make_connection();
        registry.add(conn.clone());

        let removed = registry.remove(&conn.id()).unwrap();
        assert!(Arc::ptr_eq(&removed, &conn));
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_twice_is_noop() {
        let registry = ClientRegistry::new();
        let conn = make_connection();
        registry.add(conn.clone());

        assert!(registry.remove(&conn.id()).is_some());
        assert!(registry.remove(&conn.id()).is_none());
        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let registry = ClientRegistry::new();
        assert!(registry.remove(&uuid::Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_closed_connection_cannot_be_registered() {
        let registry = ClientRegistry::new();
        let conn = make_connection();
        conn.mark_closed();
        assert!(!registry.add(conn));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_removed_connection_cannot_be_readded() {
        let registry = ClientRegistry::new();
        let conn = make_connection();
        registry.add(conn.clone());
        registry.remove(&conn.id());
        assert!(!registry.add(conn));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_contains_only_open() {
        let registry = ClientRegistry::new();
        let a = make_connection();
        let b = make_connection();
        registry.add(a.clone());
        registry.add(b.clone());
        registry.remove(&a.id());

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), b.id());
        assert!(snapshot.iter().all(|c| c.is_open()));
    }

    #[test]
    fn test_drain_empties_registry() {
        let registry = ClientRegistry::new();
        let a = make_connection();
        let b = make_connection();
        registry.add(a.clone());
        registry.add(b.clone());

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
        assert_eq!(a.state(), ConnectionState::Closing);
        assert_eq!(b.state(), ConnectionState::Closing);
    }
}
