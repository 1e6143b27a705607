//! Catalogue record shapes
//!
//! A catalogued object is produced by the scanner from a photo and an AI
//! description. The relay only ever sees it as an opaque payload; the
//! catalogue service stores and serves it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::{message_types, MessageEnvelope};

/// Real-world size in meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

/// Position or Euler rotation in scene space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Fields submitted when creating a record. Identity and timestamp are
/// assigned by the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCatalogObject {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// One of `box`, `sphere`, `cylinder`, `cone`, `irregular`
    #[serde(default)]
    pub shape: String,
    /// One of `small`, `medium`, `large`
    #[serde(default)]
    pub estimated_size: String,
    /// Hex colour, e.g. `#8B4513`
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub forensic_relevance: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vector3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Vector3>,
}

/// A stored catalogue record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogObject {
    pub id: String,
    /// RFC 3339 timestamp
    pub created_at: String,
    #[serde(flatten)]
    pub details: NewCatalogObject,
}

impl CatalogObject {
    pub fn new(id: impl Into<String>, created_at: impl Into<String>, details: NewCatalogObject) -> Self {
        Self {
            id: id.into(),
            created_at: created_at.into(),
            details,
        }
    }

    /// Record as a JSON value, the form it takes inside an envelope
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// `SPAWN_OBJECT` instruction carrying this record
    pub fn spawn_envelope(&self) -> MessageEnvelope {
        MessageEnvelope::new(message_types::SPAWN_OBJECT, self.to_payload())
    }
}
