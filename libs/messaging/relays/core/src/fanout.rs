//! # Broadcast Fan-out
//!
//! Delivers one envelope to every open connection. The envelope is encoded
//! once and the resulting frame is shared by reference across recipients.
//!
//! Broadcast never blocks on a slow client: frames are pushed with
//! `try_send`, and any client whose queue is full (or whose writer is gone)
//! is evicted. Eviction removes it from the registry and asks its task to
//! close; the task performs the actual teardown.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error, warn};

use types::MessageEnvelope;

use crate::connection::{ConnectionId, OutboundFrame};
use crate::registry::ClientRegistry;

/// Outcome of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections in the snapshot taken at broadcast time
    pub recipients: usize,
    /// Connections whose queue accepted the frame
    pub delivered: usize,
    /// Connections evicted because they could not accept the frame
    pub evicted: Vec<ConnectionId>,
}

/// Fan-out over a shared [`ClientRegistry`]
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ClientRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Send `envelope` to every connection open at the moment of the call.
    /// Zero recipients is a successful no-op; nothing is buffered for clients
    /// that connect later.
    pub fn broadcast(&self, envelope: &MessageEnvelope) -> BroadcastReport {
        let recipients = self.registry.snapshot();
        if recipients.is_empty() {
            debug!(
                "No connected clients for {} broadcast",
                envelope.message_type()
            );
            return BroadcastReport::default();
        }

        let frame: OutboundFrame = match codec::encode(envelope) {
            Ok(text) => Arc::from(text),
            Err(e) => {
                error!("Dropping {} broadcast: {}", envelope.message_type(), e);
                return BroadcastReport::default();
            }
        };
        counter!("relay_broadcasts_total").increment(1);

        let mut report = BroadcastReport {
            recipients: recipients.len(),
            ..Default::default()
        };

        for conn in &recipients {
            match conn.enqueue(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Evicting client {} ({}): {}", conn.id(), conn.peer(), e);
                    report.evicted.push(conn.id());
                }
            }
        }

        // Evict after the loop so every healthy client already has the frame
        for id in &report.evicted {
            if let Some(conn) = self.registry.remove(id) {
                conn.request_close();
                counter!("relay_evictions_total").increment(1);
            }
        }

        debug!(
            "Broadcast {} to {}/{} clients ({} evicted)",
            envelope.message_type(),
            report.delivered,
            report.recipients,
            report.evicted.len()
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionState, RemoteClientConnection};
    use serde_json::json;
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    fn add_client(
        registry: &ClientRegistry,
        capacity: usize,
    ) -> (Arc<RemoteClientConnection>, mpsc::Receiver<OutboundFrame>) {
        let peer: SocketAddr = "127.0.0.1:41000".parse().unwrap();
        let (conn, rx) = RemoteClientConnection::new(peer, capacity);
        let conn = Arc::new(conn);
        assert!(registry.add(conn.clone()));
        (conn, rx)
    }

    fn spawn_envelope() -> MessageEnvelope {
        MessageEnvelope::new("SPAWN_OBJECT", json!({"id": "a"}))
    }

    #[test]
    fn test_broadcast_with_no_clients_is_noop() {
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Broadcaster::new(registry);
        let report = broadcaster.broadcast(&spawn_envelope());
        assert_eq!(report, BroadcastReport::default());
    }

    #[test]
    fn test_every_client_receives_identical_frame() {
        let registry = Arc::new(ClientRegistry::new());
        let (_a, mut rx_a) = add_client(&registry, 4);
        let (_b, mut rx_b) = add_client(&registry, 4);
        let broadcaster = Broadcaster::new(registry);

        let report = broadcaster.broadcast(&spawn_envelope());
        assert_eq!(report.recipients, 2);
        assert_eq!(report.delivered, 2);
        assert!(report.evicted.is_empty());

        let frame_a = rx_a.try_recv().unwrap();
        let frame_b = rx_b.try_recv().unwrap();
        assert_eq!(
            frame_a.as_ref(),
            r#"{"type":"SPAWN_OBJECT","payload":{"id":"a"}}"#
        );
        // encoded once, shared by reference
        assert!(Arc::ptr_eq(&frame_a, &frame_b));
    }

    #[test]
    fn test_full_queue_evicts_only_that_client() {
        let registry = Arc::new(ClientRegistry::new());
        let (slow, _rx_slow) = add_client(&registry, 1);
        let (fast, mut rx_fast) = add_client(&registry, 8);
        let broadcaster = Broadcaster::new(registry.clone());

        broadcaster.broadcast(&spawn_envelope());
        let report = broadcaster.broadcast(&spawn_envelope());

        assert_eq!(report.evicted, vec![slow.id()]);
        assert_eq!(report.delivered, 1);
        assert!(!registry.contains(&slow.id()));
        assert_eq!(slow.state(), ConnectionState::Closing);
        assert!(slow.is_close_requested());

        assert!(registry.contains(&fast.id()));
        assert!(rx_fast.try_recv().is_ok());
        assert!(rx_fast.try_recv().is_ok());
    }

    #[test]
    fn test_dropped_writer_is_evicted() {
        let registry = Arc::new(ClientRegistry::new());
        let (gone, rx) = add_client(&registry, 4);
        drop(rx);
        let broadcaster = Broadcaster::new(registry.clone());

        let report = broadcaster.broadcast(&spawn_envelope());
        assert_eq!(report.evicted, vec![gone.id()]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_removed_client_receives_nothing() {
        let registry = Arc::new(ClientRegistry::new());
        let (conn, mut rx) = add_client(&registry, 4);
        registry.remove(&conn.id());
        let broadcaster = Broadcaster::new(registry);

        let report = broadcaster.broadcast(&spawn_envelope());
        assert_eq!(report.recipients, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_frames_arrive_in_broadcast_order() {
        let registry = Arc::new(ClientRegistry::new());
        let (_conn, mut rx) = add_client(&registry, 16);
        let broadcaster = Broadcaster::new(registry);

        for i in 0..10 {
            broadcaster.broadcast(&MessageEnvelope::new("SEQ", json!(i)));
        }
        for i in 0..10 {
            let frame = rx.try_recv().unwrap();
            let decoded = codec::decode_text(&frame).unwrap();
            assert_eq!(decoded.payload(), &json!(i));
        }
    }
}
