//! Versioned Storage Module
//!
//! The storage engine of a single shard: an in-memory map of keys to
//! versioned JSON values with optimistic concurrency control.
//!
//! ## Core Concepts
//! - **Aggregate**: The current `{value, version}` of one key. Created by the first write,
//!   mutated in place afterwards, never deleted.
//! - **Versioning**: Every successful write bumps the version by exactly one. Writers may pass
//!   an expected version; a mismatch fails fast instead of blocking.
//! - **Per-key locking**: `KeyLockCoordinator` serializes writes to the same key while
//!   leaving distinct keys fully parallel.
//! - **Access**: `handlers` exposes the store over HTTP for the router to forward to.

pub mod error;
pub mod handlers;
pub mod locks;
pub mod memory;
pub mod protocol;
pub mod types;

#[cfg(test)]
mod tests;
