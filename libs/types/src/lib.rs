//! # ForensicVR Shared Types
//!
//! Plain data definitions shared by every crate in the workspace.
//!
//! ## Design Philosophy
//!
//! - **Pure Data**: No I/O, no async, no encoding rules. Wire encoding lives in
//!   the `codec` crate, transport lives in the relay crates.
//! - **Opaque Payloads**: [`MessageEnvelope`] carries its payload as an
//!   arbitrary JSON value. The relay never inspects it.
//! - **Record Shapes**: [`CatalogObject`] mirrors the JSON records produced by
//!   the scanner UI, so it can be used both as a catalogue entry and as the
//!   payload of a `SPAWN_OBJECT` instruction.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → libs/codec → libs/messaging/relays → services/catalog
//!     ↑             ↓                ↓
//! Pure Data    Encode/Decode    Sockets, Registry
//! ```

pub mod catalog;
pub mod envelope;

pub use catalog::{CatalogObject, Dimensions, NewCatalogObject, Vector3};
pub use envelope::{message_types, MessageEnvelope};
