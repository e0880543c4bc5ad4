use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::topology::registry::NodeTopology;
use crate::topology::types::Node;

/// Virtual points placed on the ring for every physical node.
pub const VIRTUAL_NODES_PER_NODE: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    #[error("no nodes are registered; the hash ring cannot be built")]
    NoNodes,
    #[error("key must be provided")]
    EmptyKey,
}

/// Consistent-hash ring with virtual nodes.
///
/// Each node contributes [`VIRTUAL_NODES_PER_NODE`] points hashed from
/// `"{nodeId}-vn-{i}"`. A key belongs to the first point clockwise from its
/// own hash. With virtual nodes, changing the node set moves roughly
/// `1/nodeCount` of the keys instead of nearly all of them as `hash % n` would.
///
/// Built once, never mutated; safe to share across tasks without locking.
#[derive(Debug, Clone)]
pub struct PartitionRing {
    points: Vec<(u32, Node)>,
    node_count: usize,
}

impl PartitionRing {
    pub fn new(topology: &NodeTopology) -> Result<Self, RingError> {
        Self::from_nodes(topology.nodes())
    }

    pub fn from_nodes(nodes: &[Node]) -> Result<Self, RingError> {
        if nodes.is_empty() {
            return Err(RingError::NoNodes);
        }

        let mut points: Vec<(u32, Node)> = nodes
            .iter()
            .flat_map(|node| {
                (0..VIRTUAL_NODES_PER_NODE)
                    .map(move |i| (ring_hash(&format!("{}-vn-{}", node.id, i)), node.clone()))
            })
            .collect();
        points.sort_by_key(|(hash, _)| *hash);

        tracing::info!(
            "Built hash ring: {} nodes, {} virtual points",
            nodes.len(),
            points.len()
        );

        Ok(Self {
            points,
            node_count: nodes.len(),
        })
    }

    /// The node that owns `key`. Pure: the same key always maps to the same
    /// node for the same node set.
    pub fn select_node(&self, key: &str) -> Result<&Node, RingError> {
        if key.trim().is_empty() {
            return Err(RingError::EmptyKey);
        }

        let hash = ring_hash(key);
        let index = self.points.partition_point(|(point, _)| *point < hash);
        let index = if index < self.points.len() { index } else { 0 };

        Ok(&self.points[index].1)
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of virtual points on the ring.
    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

/// First four bytes of SHA-256, little-endian.
pub fn ring_hash(value: &str) -> u32 {
    let digest = Sha256::digest(value.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}
