//! Sharded Key-Value Store Library
//!
//! Core modules of a sharded, in-memory key-value store. The binary
//! (`main.rs`) runs either a storage node or the router in front of them.
//!
//! ## Architecture Modules
//! - **`storage`**: The single-shard engine. A map of keys to versioned JSON values with
//!   per-key locking and optimistic (compare-and-swap) writes.
//! - **`topology`**: The fixed set of shards, derived from a naming template and a replica count.
//! - **`routing`**: Consistent-hash partitioning, forwarding of single-key operations to the
//!   owning shard, and the cluster-wide key listing.
//! - **`config`**: Command-line and environment configuration.

pub mod config;
pub mod routing;
pub mod storage;
pub mod topology;
