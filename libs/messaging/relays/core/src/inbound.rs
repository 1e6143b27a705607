//! Inbound client messages forwarded to the control process

use std::net::SocketAddr;

use codec::DecodeError;
use types::MessageEnvelope;

use crate::connection::ConnectionId;

/// A text message received from a rendering client.
///
/// `body` is the exact text the client sent. Clients are free to send
/// non-envelope text (a bare `ready`, for instance), so `envelope` is only
/// populated when the body parses as one.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub connection_id: ConnectionId,
    pub peer: SocketAddr,
    pub body: String,
    pub envelope: Option<MessageEnvelope>,
}

impl InboundMessage {
    /// Wrap a text frame. Empty or whitespace-only frames are rejected.
    pub fn from_text(
        connection_id: ConnectionId,
        peer: SocketAddr,
        body: String,
    ) -> Result<Self, DecodeError> {
        if body.trim().is_empty() {
            return Err(DecodeError::Empty);
        }
        let envelope = codec::decode_text(&body).ok();
        Ok(Self {
            connection_id,
            peer,
            body,
            envelope,
        })
    }

    /// Wrap a binary frame, which must hold UTF-8 text
    pub fn from_binary(
        connection_id: ConnectionId,
        peer: SocketAddr,
        bytes: Vec<u8>,
    ) -> Result<Self, DecodeError> {
        let body = String::from_utf8(bytes).map_err(|e| DecodeError::InvalidUtf8 {
            valid_up_to: e.utf8_error().valid_up_to(),
        })?;
        Self::from_text(connection_id, peer, body)
    }

    pub fn message_type(&self) -> Option<&str> {
        self.envelope.as_ref().map(MessageEnvelope::message_type)
    }
}
