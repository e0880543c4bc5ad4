use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Extension, Path, Query, rejection::QueryRejection},
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::RouterError;
use super::forwarder::{ForwardedRecord, Forwarder};
use super::listing::ListingAggregator;
use super::protocol::{
    CONTENT_TYPE_NDJSON, DebugInfo, ForwardParams, ForwardedResponse, HEADER_DEBUG_EXECUTION_TIME,
    HEADER_DEBUG_NODE, HEADER_DEBUG_REQUEST_ID, KeyListingRecord,
};
use crate::storage::handlers::handle_health;
use crate::storage::protocol::{ENDPOINT_HEALTH, ENDPOINT_KV, ENDPOINT_KV_KEY, ErrorBody};
use crate::topology::types::NodeId;

const MALFORMED_BODY: &str = "The request body was not valid JSON.";
const MISSING_DELTA: &str = "PATCH delta must not be null.";
const INTERNAL_ERROR: &str = "An unexpected error occurred.";

#[derive(Clone)]
pub struct RouterState {
    pub forwarder: Arc<Forwarder>,
    pub listing: Arc<ListingAggregator>,
    pub shutdown: CancellationToken,
}

pub fn router(state: RouterState) -> Router {
    Router::new()
        .route(ENDPOINT_KV, get(handle_list))
        .route(
            ENDPOINT_KV_KEY,
            get(handle_get).put(handle_put).patch(handle_patch),
        )
        .route(ENDPOINT_HEALTH, get(handle_health))
        .layer(Extension(state))
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        match self {
            RouterError::InvalidKey(message) | RouterError::InvalidPayload(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody::new(message))).into_response()
            }
            RouterError::RemoteRejected { node, status, body } => {
                tracing::warn!("Node {} responded with status {}", node, status.as_u16());
                if body.trim().is_empty() {
                    return status.into_response();
                }
                (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
            }
            RouterError::RemoteUnreachable {
                node,
                address,
                cause,
            } => {
                tracing::error!("Node {} at {} is unavailable: {}", node, address, cause);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorBody::new(format!("Node '{}' is unavailable.", node))),
                )
                    .into_response()
            }
            RouterError::InvalidResponse { node, cause } => {
                tracing::error!("Unreadable response from node {}: {}", node, cause);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody::new(INTERNAL_ERROR)),
                )
                    .into_response()
            }
            RouterError::Cancelled => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody::new("The request was cancelled.")),
            )
                .into_response(),
        }
    }
}

pub async fn handle_list(Extension(state): Extension<RouterState>) -> Response {
    let cancel = state.shutdown.child_token();

    match state.listing.list(&cancel).await {
        Ok(records) => {
            tracing::info!("Listed {} keys", records.len());
            ([(header::CONTENT_TYPE, CONTENT_TYPE_NDJSON)], to_ndjson(&records)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn handle_get(
    Extension(state): Extension<RouterState>,
    Path(key): Path<String>,
    query: Result<Query<ForwardParams>, QueryRejection>,
) -> Response {
    let started = Instant::now();
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => return invalid_query(rejection),
    };
    let cancel = state.shutdown.child_token();

    let outcome = state.forwarder.get(&key, &cancel).await;
    respond(params.debug, started.elapsed(), outcome)
}

pub async fn handle_put(
    Extension(state): Extension<RouterState>,
    Path(key): Path<String>,
    query: Result<Query<ForwardParams>, QueryRejection>,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => return invalid_query(rejection),
    };
    let value = match parse_body(&body, MALFORMED_BODY) {
        Ok(value) => value,
        Err(e) => return e.into_response(),
    };
    let cancel = state.shutdown.child_token();

    let outcome = state
        .forwarder
        .put(&key, &value, params.if_version, &cancel)
        .await;
    respond(params.debug, started.elapsed(), outcome)
}

pub async fn handle_patch(
    Extension(state): Extension<RouterState>,
    Path(key): Path<String>,
    query: Result<Query<ForwardParams>, QueryRejection>,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => return invalid_query(rejection),
    };
    let delta = match parse_body(&body, MISSING_DELTA) {
        Ok(Value::Null) => {
            return RouterError::InvalidPayload(MISSING_DELTA.to_string()).into_response();
        }
        Ok(delta) => delta,
        Err(e) => return e.into_response(),
    };
    let cancel = state.shutdown.child_token();

    let outcome = state
        .forwarder
        .patch(&key, &delta, params.if_version, &cancel)
        .await;
    respond(params.debug, started.elapsed(), outcome)
}

fn invalid_query(rejection: QueryRejection) -> Response {
    RouterError::InvalidPayload(rejection.body_text()).into_response()
}

fn respond(
    debug: bool,
    elapsed: Duration,
    outcome: Result<ForwardedRecord, RouterError>,
) -> Response {
    let request_id = Uuid::new_v4();

    let (node, mut response) = match outcome {
        Ok(forwarded) => {
            let debug = debug.then(|| DebugInfo {
                node: forwarded.node_id.clone(),
                execution_time_ms: millis(forwarded.elapsed),
            });
            let body = ForwardedResponse {
                record: forwarded.record,
                debug,
            };
            (Some(forwarded.node_id), Json(body).into_response())
        }
        Err(e) => {
            let node = e.node().cloned();
            (node, e.into_response())
        }
    };

    attach_debug_headers(&mut response, request_id, node.as_ref(), elapsed);
    response
}

fn attach_debug_headers(
    response: &mut Response,
    request_id: Uuid,
    node: Option<&NodeId>,
    elapsed: Duration,
) {
    let headers = response.headers_mut();
    let mut insert = |name: &'static str, value: String| {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    };

    insert(HEADER_DEBUG_REQUEST_ID, request_id.to_string());
    if let Some(node) = node {
        insert(HEADER_DEBUG_NODE, node.to_string());
    }
    insert(HEADER_DEBUG_EXECUTION_TIME, format!("{:.2}", millis(elapsed)));
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn parse_body(body: &[u8], empty_message: &str) -> Result<Value, RouterError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(RouterError::InvalidPayload(empty_message.to_string()));
    }
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("Rejected request body: {}", e);
        RouterError::InvalidPayload(MALFORMED_BODY.to_string())
    })
}

fn to_ndjson(records: &[KeyListingRecord]) -> Body {
    let mut payload = String::new();
    for record in records {
        match serde_json::to_string(record) {
            Ok(line) => {
                payload.push_str(&line);
                payload.push('\n');
            }
            Err(e) => tracing::warn!("Failed to serialize listing record: {}", e),
        }
    }
    Body::from(payload)
}
