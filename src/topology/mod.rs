//! Cluster Topology Module
//!
//! The fixed set of shards that together hold the keyspace. Membership is
//! static: the list is derived once from configuration at startup and never
//! changes while the process runs.
//!
//! - **`types`**: `Node` and `NodeId`.
//! - **`registry`**: `TopologyConfig` and the `NodeTopology` builder with its validation rules.

pub mod registry;
pub mod types;
