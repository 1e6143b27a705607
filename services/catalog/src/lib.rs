//! ForensicVR Catalogue Service
//!
//! Stores scanned objects in memory, serves them over HTTP, and pushes a
//! chosen object to every connected rendering client through the relay's
//! control bridge.

pub mod api;
pub mod error;
pub mod store;

pub use api::{routes, AppState};
pub use error::{CatalogError, CatalogResult};
pub use store::CatalogStore;
