use futures::future::try_join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::client::NodeClient;
use super::error::RouterError;
use super::protocol::KeyListingRecord;
use crate::topology::registry::NodeTopology;

/// Lists the whole keyspace by asking every shard for its keys.
///
/// The ring is not consulted: each key is tagged with the node that actually
/// returned it. One failing shard fails the whole listing.
pub struct ListingAggregator {
    topology: Arc<NodeTopology>,
    client: NodeClient,
}

impl ListingAggregator {
    pub fn new(topology: Arc<NodeTopology>, client: NodeClient) -> Self {
        Self { topology, client }
    }

    /// All keys of all shards, sorted by (node, key).
    pub async fn list(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<KeyListingRecord>, RouterError> {
        let calls = self.topology.nodes().iter().map(|node| async move {
            let keys = self.client.list_keys(node).await?;
            tracing::debug!("Node {} holds {} keys", node.id, keys.len());
            Ok::<_, RouterError>(
                keys.into_iter()
                    .map(|key| KeyListingRecord {
                        key,
                        node: node.id.clone(),
                    })
                    .collect::<Vec<_>>(),
            )
        });

        let per_node = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RouterError::Cancelled),
            result = try_join_all(calls) => result?,
        };

        let mut records: Vec<KeyListingRecord> = per_node.into_iter().flatten().collect();
        records.sort_by(|a, b| a.node.cmp(&b.node).then_with(|| a.key.cmp(&b.key)));

        Ok(records)
    }
}
