//! Router Protocol
//!
//! Shapes the router adds on top of the storage node protocol: the listing
//! records and the optional debug envelope on forwarded responses.

use serde::{Deserialize, Serialize};

use crate::storage::protocol::KeyValueRecord;
use crate::topology::types::NodeId;

pub const CONTENT_TYPE_NDJSON: &str = "application/x-ndjson";

pub const HEADER_DEBUG_REQUEST_ID: &str = "x-debug-requestid";
pub const HEADER_DEBUG_NODE: &str = "x-debug-node";
pub const HEADER_DEBUG_EXECUTION_TIME: &str = "x-debug-executiontimems";

/// One line of the `GET /kv` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyListingRecord {
    pub key: String,
    pub node: NodeId,
}

/// Query string of forwarded routes.
#[derive(Debug, Default, Deserialize)]
pub struct ForwardParams {
    #[serde(rename = "ifVersion")]
    pub if_version: Option<u64>,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub node: NodeId,
    pub execution_time_ms: f64,
}

/// A forwarded record, optionally carrying routing details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardedResponse {
    #[serde(flatten)]
    pub record: KeyValueRecord,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub debug: Option<DebugInfo>,
}
