use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path, Query, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::error::StoreError;
use super::memory::VersionedStore;
use super::protocol::{
    ENDPOINT_HEALTH, ENDPOINT_KV, ENDPOINT_KV_KEY, ErrorBody, KeyValueRecord, WriteParams,
};

const MALFORMED_BODY: &str = "The request body was not valid JSON.";
const MISSING_DELTA: &str = "PATCH delta must not be null.";

/// Shared state of a storage node's HTTP surface.
#[derive(Clone)]
pub struct NodeState {
    pub store: Arc<VersionedStore>,
    /// Cancelled on shutdown; each request waits on a child of it.
    pub shutdown: CancellationToken,
}

pub fn router(state: NodeState) -> Router {
    Router::new()
        .route(ENDPOINT_KV, get(handle_list_keys))
        .route(
            ENDPOINT_KV_KEY,
            get(handle_get).put(handle_put).patch(handle_patch),
        )
        .route(ENDPOINT_HEALTH, get(handle_health))
        .layer(Extension(state))
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!("Request aborted: {}", self);
        }
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

pub async fn handle_list_keys(Extension(state): Extension<NodeState>) -> Json<Vec<String>> {
    let keys = state.store.list_keys();
    tracing::debug!("Listing {} keys", keys.len());
    Json(keys)
}

pub async fn handle_get(
    Extension(state): Extension<NodeState>,
    Path(key): Path<String>,
) -> Result<Json<KeyValueRecord>, StoreError> {
    state.store.get(&key).map(Json)
}

pub async fn handle_put(
    Extension(state): Extension<NodeState>,
    Path(key): Path<String>,
    query: Result<Query<WriteParams>, QueryRejection>,
    body: Bytes,
) -> Result<Json<KeyValueRecord>, StoreError> {
    let Query(params) = query.map_err(invalid_query)?;
    let value = parse_body(&body)?
        .ok_or_else(|| StoreError::InvalidPayload(MALFORMED_BODY.to_string()))?;
    let cancel = state.shutdown.child_token();

    let record = state
        .store
        .put(&key, value, params.if_version, &cancel)
        .await?;

    tracing::info!("PUT {} -> version {}", record.key, record.version);
    Ok(Json(record))
}

pub async fn handle_patch(
    Extension(state): Extension<NodeState>,
    Path(key): Path<String>,
    query: Result<Query<WriteParams>, QueryRejection>,
    body: Bytes,
) -> Result<Json<KeyValueRecord>, StoreError> {
    let Query(params) = query.map_err(invalid_query)?;
    let delta = parse_body(&body)?
        .ok_or_else(|| StoreError::InvalidPayload(MISSING_DELTA.to_string()))?;
    let cancel = state.shutdown.child_token();

    let record = state
        .store
        .patch(&key, delta, params.if_version, &cancel)
        .await?;

    tracing::info!("PATCH {} -> version {}", record.key, record.version);
    Ok(Json(record))
}

pub async fn handle_health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

fn invalid_query(rejection: QueryRejection) -> StoreError {
    StoreError::InvalidPayload(rejection.body_text())
}

/// `Ok(None)` for an empty body, `Err` for anything that is not JSON.
fn parse_body(body: &[u8]) -> Result<Option<Value>, StoreError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body).map(Some).map_err(|e| {
        tracing::debug!("Rejected request body: {}", e);
        StoreError::InvalidPayload(MALFORMED_BODY.to_string())
    })
}
