//! Error types for the catalogue service

use thiserror::Error;
use warp::http::StatusCode;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Object not found: {id}")]
    NotFound { id: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl CatalogError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CatalogError::NotFound { .. } => StatusCode::NOT_FOUND,
            CatalogError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl warp::reject::Reject for CatalogError {}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
