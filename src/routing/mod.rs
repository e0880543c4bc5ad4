//! Routing Module
//!
//! Turns the fixed set of storage nodes into one logical keyspace.
//!
//! ## Core Concepts
//! - **Partitioning**: `PartitionRing` places every node on a consistent-hash ring with
//!   virtual points; a key belongs to the first point at or after its own hash.
//! - **Forwarding**: `Forwarder` sends each single-key operation to its owning node and
//!   returns the node's answer, keeping "node is down" apart from "node said no".
//! - **Listing**: `ListingAggregator` asks every node for its keys and merges the results.
//! - **Access**: `handlers` exposes the router over HTTP with the same routes as a node.
//!
//! There is no retry, failover or replication: a shard failure reaches the caller as-is.

pub mod client;
pub mod error;
pub mod forwarder;
pub mod handlers;
pub mod listing;
pub mod protocol;
pub mod ring;
