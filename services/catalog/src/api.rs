//! HTTP routes for the catalogue
//!
//! ```text
//! GET    /api/objects              list, newest first
//! POST   /api/objects              create
//! DELETE /api/objects/{id}         delete (idempotent)
//! POST   /api/objects/{id}/spawn   push SPAWN_OBJECT to rendering clients
//! GET    /health
//! GET    /status
//! ```

use std::convert::Infallible;
use std::sync::Arc;

use metrics::counter;
use serde_json::json;
use tracing::{info, warn};
use warp::filters::body::BodyDeserializeError;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use relay_config::CatalogSettings;
use relays::ControlBridge;
use types::NewCatalogObject;

use crate::error::CatalogError;
use crate::store::CatalogStore;

/// Shared handles for request handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CatalogStore>,
    pub bridge: Arc<ControlBridge>,
}

impl AppState {
    pub fn new(store: Arc<CatalogStore>, bridge: Arc<ControlBridge>) -> Self {
        Self { store, bridge }
    }
}

/// Every route, with rejection handling and optional CORS
pub fn routes(state: AppState, settings: &CatalogSettings) -> BoxedFilter<(Box<dyn Reply>,)> {
    let api = api_routes(state, settings.max_body_bytes);

    if settings.enable_cors {
        let cors = warp::cors()
            .allow_any_origin()
            .allow_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
            .allow_headers(vec!["content-type"]);
        // Recover first so error replies carry the CORS headers too
        api.recover(handle_rejection)
            .with(cors)
            .map(|reply| Box::new(reply) as Box<dyn Reply>)
            .boxed()
    } else {
        api.recover(handle_rejection)
            .map(|reply| Box::new(reply) as Box<dyn Reply>)
            .boxed()
    }
}

fn api_routes(
    state: AppState,
    max_body_bytes: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list = warp::path!("api" / "objects")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_objects);

    let create = warp::path!("api" / "objects")
        .and(warp::post())
        .and(warp::body::content_length_limit(max_body_bytes))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(create_object);

    let delete = warp::path!("api" / "objects" / String)
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and_then(delete_object);

    let spawn = warp::path!("api" / "objects" / String / "spawn")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and_then(spawn_object);

    let health = warp::path!("health")
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", StatusCode::OK));

    let status = warp::path!("status")
        .and(warp::get())
        .and(with_state(state))
        .map(|state: AppState| {
            warp::reply::json(&json!({
                "status": "running",
                "service": "forensicvr-catalog",
                "version": env!("CARGO_PKG_VERSION"),
                "connectedClients": state.bridge.connected_clients(),
                "objects": state.store.len(),
            }))
        });

    list.or(create)
        .or(delete)
        .or(spawn)
        .or(health)
        .or(status)
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

async fn list_objects(state: AppState) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&state.store.list()))
}

async fn create_object(details: NewCatalogObject, state: AppState) -> Result<impl Reply, Rejection> {
    let record = state.store.create(details).map_err(warp::reject::custom)?;
    Ok(warp::reply::json(&record))
}

async fn delete_object(id: String, state: AppState) -> Result<impl Reply, Rejection> {
    state.store.delete(&id);
    Ok(warp::reply::json(&json!({ "success": true })))
}

async fn spawn_object(id: String, state: AppState) -> Result<impl Reply, Rejection> {
    let record = state
        .store
        .get(&id)
        .ok_or_else(|| warp::reject::custom(CatalogError::NotFound { id: id.clone() }))?;

    info!(
        "Sending {} to {} rendering clients",
        record.details.name,
        state.bridge.connected_clients()
    );
    state.bridge.send_envelope(&record.spawn_envelope());
    counter!("catalog_spawn_requests_total").increment(1);

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "sent": true })),
        StatusCode::ACCEPTED,
    ))
}

/// Map rejections to JSON error bodies
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<CatalogError>() {
        (e.status_code(), e.to_string())
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid body: {}", e))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".to_string())
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length required".to_string())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected application/json".to_string(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        warn!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "error": message })),
        code,
    ))
}
