//! In-memory catalogue of scanned objects
//!
//! Records live only as long as the process. Listing returns the newest
//! record first.

use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use tracing::info;
use uuid::Uuid;

use types::{CatalogObject, NewCatalogObject};

use crate::error::{CatalogError, CatalogResult};

#[derive(Debug, Default)]
pub struct CatalogStore {
    objects: RwLock<Vec<CatalogObject>>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, newest first
    pub fn list(&self) -> Vec<CatalogObject> {
        self.objects.read().clone()
    }

    /// Assign an id and creation time, then store the record
    pub fn create(&self, details: NewCatalogObject) -> CatalogResult<CatalogObject> {
        if details.name.trim().is_empty() {
            return Err(CatalogError::InvalidRequest {
                message: "name must not be empty".to_string(),
            });
        }

        let record = CatalogObject::new(
            Uuid::new_v4().to_string(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            details,
        );
        self.objects.write().insert(0, record.clone());
        info!("Catalogued {} ({})", record.details.name, record.id);
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Option<CatalogObject> {
        self.objects.read().iter().find(|o| o.id == id).cloned()
    }

    /// Remove a record. Returns whether anything was removed; deleting an
    /// unknown id is not an error.
    pub fn delete(&self, id: &str) -> bool {
        let mut objects = self.objects.write();
        let before = objects.len();
        objects.retain(|o| o.id != id);
        let removed = objects.len() != before;
        if removed {
            info!("Deleted catalogue object {}", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}
