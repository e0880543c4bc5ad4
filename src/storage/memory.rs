use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::StoreError;
use super::locks::KeyLockCoordinator;
use super::protocol::KeyValueRecord;
use super::types::{Aggregate, Mutation, ensure_absent, validate_key};

/// The storage engine of a single shard.
///
/// Reads go straight to the map and return deep copies. Writes are serialized
/// per key through [`KeyLockCoordinator`] and checked against the caller's
/// expected version before anything is stored.
#[derive(Default)]
pub struct VersionedStore {
    entries: DashMap<String, Aggregate>,
    locks: KeyLockCoordinator,
}

impl VersionedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Result<KeyValueRecord, StoreError> {
        validate_key(key)?;

        self.entries
            .get(key)
            .map(|entry| entry.value().snapshot())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    pub async fn put(
        &self,
        key: &str,
        value: Value,
        expected_version: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<KeyValueRecord, StoreError> {
        validate_key(key)?;
        self.mutate(key, Mutation::Replace(value), expected_version, cancel)
            .await
    }

    pub async fn patch(
        &self,
        key: &str,
        delta: Value,
        expected_version: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<KeyValueRecord, StoreError> {
        validate_key(key)?;
        if delta.is_null() {
            return Err(StoreError::InvalidPayload(
                "PATCH delta must not be null.".to_string(),
            ));
        }
        self.mutate(key, Mutation::Merge(delta), expected_version, cancel)
            .await
    }

    /// All keys held by this shard, sorted.
    pub fn list_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn mutate(
        &self,
        key: &str,
        mutation: Mutation,
        expected_version: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<KeyValueRecord, StoreError> {
        let operation = mutation.name();

        let outcome = self
            .locks
            .run_exclusive(key, operation, cancel, || {
                self.apply_locked(key, mutation, expected_version)
            })
            .await?;

        match &outcome {
            Ok(record) => {
                tracing::debug!("{} stored key '{}' at version {}", operation, key, record.version)
            }
            Err(e) => tracing::debug!("{} rejected for key '{}': {}", operation, key, e),
        }

        outcome
    }

    // Caller must hold the key lock.
    fn apply_locked(
        &self,
        key: &str,
        mutation: Mutation,
        expected_version: Option<u64>,
    ) -> Result<KeyValueRecord, StoreError> {
        let current = self.entries.get(key).map(|entry| entry.value().clone());

        let next = match current {
            None => {
                ensure_absent(key, expected_version)?;
                Aggregate::create(key, mutation)
            }
            Some(mut aggregate) => {
                aggregate.apply(mutation, expected_version)?;
                aggregate
            }
        };

        let record = next.snapshot();
        self.entries.insert(key.to_string(), next);
        Ok(record)
    }
}
