//! # ForensicVR Relay Codec
//!
//! ## Purpose
//!
//! The "Rules" layer for the relay wire format. Every frame on the relay is a
//! single JSON text object:
//!
//! ```text
//! { "type": "<string>", "payload": <any JSON value> }
//! ```
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/messaging/relays
//!     ↑           ↓              ↓
//! Pure Data   Encode/Decode   Sockets
//! ```
//!
//! ## What This Crate Contains
//! - [`encode`]: deterministic envelope serialization
//! - [`decode`] / [`decode_text`]: structural validation into a [`MessageEnvelope`]
//! - [`DecodeError`]: why an inbound frame was rejected
//! - [`EncodeError`]: serialization failure on the way out
//!
//! ## What This Crate Does NOT Contain
//! - Socket handling or framing (WebSocket frames delimit messages)
//! - Interpretation of `type` or `payload`; unknown types pass through

pub mod envelope;
pub mod error;

pub use envelope::{decode, decode_text, encode};
pub use error::{CodecResult, DecodeError, EncodeError};
pub use types::MessageEnvelope;
