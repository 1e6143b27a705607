//! # ForensicVR Relay
//!
//! Accepts WebSocket connections from remote rendering clients and bridges
//! them to a single local control process.
//!
//! ```text
//! control process ──send_to_clients──▶ ControlBridge ──▶ RelayServer::broadcast ──▶ clients
//! control process ◀──on_inbound_message── ControlBridge ◀── receive loops ◀────────── clients
//! ```
//!
//! The building blocks (connection state, registry, fan-out) live in
//! [`relay_core`]; this crate owns the sockets.

use std::sync::Arc;

use tokio::sync::mpsc;

use relay_config::RelaySettings;
use relay_core::{ClientRegistry, RelayResult};

pub mod bridge;
mod handler;
pub mod server;

pub use relay_core as core;

pub use bridge::ControlBridge;
pub use server::RelayServer;

/// Start a relay on a fresh registry and wire a [`ControlBridge`] to it
pub async fn start(settings: &RelaySettings) -> RelayResult<(RelayServer, ControlBridge)> {
    let registry = Arc::new(ClientRegistry::new());
    let (inbound_tx, inbound_rx) = mpsc::channel(settings.inbound_queue_capacity.max(1));

    let server = RelayServer::start(settings, registry, inbound_tx).await?;
    let bridge = ControlBridge::new(server.broadcaster(), inbound_rx);
    Ok((server, bridge))
}
