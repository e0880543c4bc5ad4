//! Storage Node Protocol
//!
//! Endpoints and Data Transfer Objects served by a storage node. The router
//! speaks the same shapes when it forwards requests, so these types are shared
//! by both sides of the hop.
//!
//! Property names are PascalCase on the wire (`Key`, `Value`, `Version`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

// --- API Endpoints ---

/// Collection endpoint: lists keys (GET).
pub const ENDPOINT_KV: &str = "/kv";
/// Item endpoint: GET / PUT / PATCH a single key.
pub const ENDPOINT_KV_KEY: &str = "/kv/:key";
/// Liveness probe.
pub const ENDPOINT_HEALTH: &str = "/health";

// --- Data Transfer Objects ---

/// Snapshot of a key at a given version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyValueRecord {
    pub key: String,
    pub value: Value,
    pub version: u64,
}

/// Query string accepted by PUT and PATCH.
///
/// `ifVersion` omitted means an unconditional write; `ifVersion=0` means the
/// key must not exist yet.
#[derive(Debug, Default, Deserialize)]
pub struct WriteParams {
    #[serde(rename = "ifVersion")]
    pub if_version: Option<u64>,
}

/// Body of every non-success response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
