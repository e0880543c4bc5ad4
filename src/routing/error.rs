use axum::http::StatusCode;
use thiserror::Error;

use super::ring::RingError;
use crate::topology::types::NodeId;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("{0}")]
    InvalidKey(String),

    #[error("{0}")]
    InvalidPayload(String),

    /// The shard answered, but not with a success status. `body` is the
    /// shard's response, untouched.
    #[error("Node '{node}' responded with {status}.")]
    RemoteRejected {
        node: NodeId,
        status: StatusCode,
        body: String,
    },

    /// The shard could not be contacted at all.
    #[error("Unable to reach node '{node}' at {address}.")]
    RemoteUnreachable {
        node: NodeId,
        address: String,
        #[source]
        cause: reqwest::Error,
    },

    /// The shard answered with success but the body could not be decoded.
    #[error("Node '{node}' returned an unreadable response.")]
    InvalidResponse {
        node: NodeId,
        #[source]
        cause: reqwest::Error,
    },

    #[error("The request was cancelled.")]
    Cancelled,
}

impl RouterError {
    /// The shard involved, if the failure happened on the far side of the hop.
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            RouterError::RemoteRejected { node, .. }
            | RouterError::RemoteUnreachable { node, .. }
            | RouterError::InvalidResponse { node, .. } => Some(node),
            _ => None,
        }
    }
}

impl From<RingError> for RouterError {
    fn from(e: RingError) -> Self {
        RouterError::InvalidKey(e.to_string())
    }
}
