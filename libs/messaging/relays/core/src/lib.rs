//! # ForensicVR Relay Core Infrastructure
//!
//! Shared building blocks for the relay server: the per-client connection
//! state machine, the client registry, broadcast fan-out, and the relay error
//! taxonomy.
//!
//! ## Architecture Role
//!
//! ```text
//! ControlBridge ──broadcast──▶ Broadcaster ──snapshot──▶ ClientRegistry
//!                                   │
//!                                   └──try_send──▶ RemoteClientConnection queues
//! ```
//!
//! Nothing in this crate touches a socket. The `relays` crate owns the
//! listener and the per-connection tasks and drives these types.

pub mod connection;
pub mod error;
pub mod fanout;
pub mod inbound;
pub mod registry;

// Re-export commonly used types
pub use connection::{ConnectionId, ConnectionState, OutboundFrame, RemoteClientConnection};
pub use error::{RelayError, RelayResult};
pub use fanout::{BroadcastReport, Broadcaster};
pub use inbound::InboundMessage;
pub use registry::ClientRegistry;
