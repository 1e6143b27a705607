//! # Control Bridge
//!
//! The single channel between the local control process and the relay.
//!
//! Outbound, [`ControlBridge::send_to_clients`] wraps a payload in an
//! envelope and broadcasts it, returning immediately. Inbound, every message
//! received from any client is funnelled through one FIFO channel into a
//! dispatcher task, which invokes the registered handlers in the order the
//! receive loops observed the messages.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use relay_core::{Broadcaster, InboundMessage};
use types::MessageEnvelope;

type InboundHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

pub struct ControlBridge {
    broadcaster: Broadcaster,
    handlers: Arc<RwLock<Vec<InboundHandler>>>,
    dispatcher: JoinHandle<()>,
}

impl ControlBridge {
    /// Start the dispatcher for `inbound`. Must be called inside a tokio
    /// runtime.
    pub fn new(broadcaster: Broadcaster, inbound: mpsc::Receiver<InboundMessage>) -> Self {
        let handlers: Arc<RwLock<Vec<InboundHandler>>> = Arc::default();
        let dispatcher = tokio::spawn(dispatch(inbound, handlers.clone()));

        Self {
            broadcaster,
            handlers,
            dispatcher,
        }
    }

    /// Broadcast `payload` to every connected client. `message_type` falls
    /// back to `SPAWN_OBJECT`. Fire-and-forget: no acknowledgement and no
    /// recipient count.
    pub fn send_to_clients(&self, payload: Value, message_type: Option<&str>) {
        let envelope = MessageEnvelope::with_optional_type(message_type, payload);
        self.send_envelope(&envelope);
    }

    pub fn send_envelope(&self, envelope: &MessageEnvelope) {
        let report = self.broadcaster.broadcast(envelope);
        trace!(
            "{} sent to {} clients",
            envelope.message_type(),
            report.delivered
        );
    }

    /// Register a callback invoked once per inbound message.
    ///
    /// Handlers run on the dispatcher task, so a slow handler delays every
    /// message behind it.
    pub fn on_inbound_message<F>(&self, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(handler));
    }

    /// Inbound messages as a stream. Messages received before the call are
    /// not replayed.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<InboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on_inbound_message(move |message| {
            // Receiver dropped: nothing left to notify
            let _ = tx.send(message.clone());
        });
        rx
    }

    pub fn connected_clients(&self) -> usize {
        self.broadcaster.registry().len()
    }
}

impl Drop for ControlBridge {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn dispatch(
    mut inbound: mpsc::Receiver<InboundMessage>,
    handlers: Arc<RwLock<Vec<InboundHandler>>>,
) {
    while let Some(message) = inbound.recv().await {
        // Clone out so handlers may register further handlers
        let current: Vec<InboundHandler> = handlers.read().clone();
        if current.is_empty() {
            debug!(
                "No inbound handler registered, dropping message from {}",
                message.connection_id
            );
            continue;
        }
        for handler in &current {
            handler(&message);
        }
    }
    debug!("Inbound channel closed, dispatcher stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{ClientRegistry, RemoteClientConnection};
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn peer() -> SocketAddr {
        "127.0.0.1:45000".parse().unwrap()
    }

    fn inbound(body: &str) -> InboundMessage {
        InboundMessage::from_text(Uuid::nil(), peer(), body.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_send_to_clients_defaults_type() {
        let registry = Arc::new(ClientRegistry::new());
        let (conn, mut rx) = RemoteClientConnection::new(peer(), 4);
        registry.add(Arc::new(conn));

        let (_tx, inbound_rx) = mpsc::channel(4);
        let bridge = ControlBridge::new(Broadcaster::new(registry), inbound_rx);

        bridge.send_to_clients(json!({"id": "obj-1"}), None);
        bridge.send_to_clients(json!(1), Some("TELEMETRY"));

        assert_eq!(
            rx.recv().await.unwrap().as_ref(),
            r#"{"type":"SPAWN_OBJECT","payload":{"id":"obj-1"}}"#
        );
        assert_eq!(
            rx.recv().await.unwrap().as_ref(),
            r#"{"type":"TELEMETRY","payload":1}"#
        );
    }

    #[tokio::test]
    async fn test_send_without_clients_is_silent() {
        let (_tx, inbound_rx) = mpsc::channel(4);
        let bridge = ControlBridge::new(
            Broadcaster::new(Arc::new(ClientRegistry::new())),
            inbound_rx,
        );
        bridge.send_to_clients(json!({}), None);
        assert_eq!(bridge.connected_clients(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_preserves_order() {
        let (tx, inbound_rx) = mpsc::channel(16);
        let bridge = ControlBridge::new(
            Broadcaster::new(Arc::new(ClientRegistry::new())),
            inbound_rx,
        );
        let mut events = bridge.subscribe();

        for body in ["ready", "one", "two"] {
            tx.send(inbound(body)).await.unwrap();
        }

        assert_eq!(events.recv().await.unwrap().body, "ready");
        assert_eq!(events.recv().await.unwrap().body, "one");
        assert_eq!(events.recv().await.unwrap().body, "two");
    }

    #[tokio::test]
    async fn test_every_handler_sees_each_message_once() {
        let (tx, inbound_rx) = mpsc::channel(16);
        let bridge = ControlBridge::new(
            Broadcaster::new(Arc::new(ClientRegistry::new())),
            inbound_rx,
        );

        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        bridge.on_inbound_message(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut events = bridge.subscribe();

        tx.send(inbound("a")).await.unwrap();
        tx.send(inbound("b")).await.unwrap();
        events.recv().await.unwrap();
        events.recv().await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
