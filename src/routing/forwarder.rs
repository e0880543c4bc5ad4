use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::client::NodeClient;
use super::error::RouterError;
use super::ring::PartitionRing;
use crate::storage::protocol::KeyValueRecord;
use crate::storage::types::validate_key;
use crate::topology::types::{Node, NodeId};

/// A record returned by a shard, with where and how long it took.
#[derive(Debug, Clone)]
pub struct ForwardedRecord {
    pub record: KeyValueRecord,
    pub node_id: NodeId,
    pub elapsed: Duration,
}

/// Routes single-key operations to the shard that owns the key.
pub struct Forwarder {
    ring: Arc<PartitionRing>,
    client: NodeClient,
}

impl Forwarder {
    pub fn new(ring: Arc<PartitionRing>, client: NodeClient) -> Self {
        Self { ring, client }
    }

    pub fn ring(&self) -> &PartitionRing {
        &self.ring
    }

    pub async fn get(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<ForwardedRecord, RouterError> {
        let node = self.owner(key)?;
        self.forward(node, "GET", key, cancel, self.client.get(node, key))
            .await
    }

    pub async fn put(
        &self,
        key: &str,
        value: &Value,
        expected_version: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<ForwardedRecord, RouterError> {
        let node = self.owner(key)?;
        self.forward(
            node,
            "PUT",
            key,
            cancel,
            self.client.put(node, key, value, expected_version),
        )
        .await
    }

    pub async fn patch(
        &self,
        key: &str,
        delta: &Value,
        expected_version: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<ForwardedRecord, RouterError> {
        let node = self.owner(key)?;
        self.forward(
            node,
            "PATCH",
            key,
            cancel,
            self.client.patch(node, key, delta, expected_version),
        )
        .await
    }

    fn owner(&self, key: &str) -> Result<&Node, RouterError> {
        let node = self.ring.select_node(key)?;
        validate_key(key).map_err(|e| RouterError::InvalidKey(e.to_string()))?;
        Ok(node)
    }

    async fn forward(
        &self,
        node: &Node,
        operation: &str,
        key: &str,
        cancel: &CancellationToken,
        call: impl Future<Output = Result<KeyValueRecord, RouterError>>,
    ) -> Result<ForwardedRecord, RouterError> {
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RouterError::Cancelled),
            result = call => result,
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok(record) => {
                tracing::debug!(
                    "{} {} served by {} in {:.2}ms",
                    operation,
                    key,
                    node.id,
                    elapsed.as_secs_f64() * 1000.0
                );
                Ok(ForwardedRecord {
                    record,
                    node_id: node.id.clone(),
                    elapsed,
                })
            }
            Err(e) => {
                tracing::debug!("{} {} failed on {}: {}", operation, key, node.id, e);
                Err(e)
            }
        }
    }
}
