//! Relay-specific errors
//!
//! Only [`RelayError::Bind`] ever reaches a caller. Every other variant is
//! confined to the connection it happened on and ends up in a log line.

use std::net::SocketAddr;

use codec::DecodeError;

use crate::connection::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Listening socket unavailable at startup
    #[error("Failed to bind relay listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Malformed or timed-out connection attempt
    #[error("WebSocket handshake with {peer} failed: {reason}")]
    Handshake { peer: SocketAddr, reason: String },

    /// Malformed inbound message body
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Recipient unreachable
    #[error("Write to connection {id} failed: {reason}")]
    Write { id: ConnectionId, reason: String },

    /// Recipient saturated
    #[error("Outbound queue full for connection {id} (capacity {capacity})")]
    QueueFull { id: ConnectionId, capacity: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// Faults that tear down the connection they happened on
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, RelayError::Write { .. } | RelayError::QueueFull { .. })
    }
}

/// Result type for relay operations
pub type RelayResult<T> = std::result::Result<T, RelayError>;
