use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use super::error::StoreError;
use super::protocol::KeyValueRecord;

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9:\-_=.*,@#]+$").expect("key pattern is valid"));

/// Rejects keys that are empty or contain anything outside `[A-Za-z0-9]`
/// and the symbols `: - _ = . * , @ #`.
///
/// Keys made only of dots are rejected too: `.` and `..` are path segments
/// in a URL and cannot be addressed as `/kv/{key}`.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if KEY_PATTERN.is_match(key) && !key.bytes().all(|b| b == b'.') {
        Ok(())
    } else {
        Err(StoreError::InvalidKey {
            key: key.to_string(),
        })
    }
}

/// A write applied to an existing (or newly created) aggregate.
///
/// The set of writes is closed: every variant is handled in
/// [`Aggregate::apply`], so adding one is a compile-time change.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// PUT: the value is replaced wholesale.
    Replace(Value),
    /// PATCH: shallow merge when both sides are objects, replace otherwise.
    Merge(Value),
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Replace(_) => "put",
            Mutation::Merge(_) => "patch",
        }
    }

    fn into_value(self) -> Value {
        match self {
            Mutation::Replace(value) | Mutation::Merge(value) => value,
        }
    }
}

/// Current state of a single key.
///
/// Owned exclusively by the store; callers only ever see [`KeyValueRecord`]
/// snapshots, which are deep copies.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    key: String,
    value: Value,
    version: u64,
}

impl Aggregate {
    /// First write of a key. The mutation's payload becomes the value as-is.
    pub fn create(key: &str, mutation: Mutation) -> Self {
        Self {
            key: key.to_string(),
            value: mutation.into_value(),
            version: 1,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Applies `mutation` if `expected_version` (when given) matches.
    /// On mismatch nothing is modified.
    pub fn apply(
        &mut self,
        mutation: Mutation,
        expected_version: Option<u64>,
    ) -> Result<(), StoreError> {
        self.ensure_version(expected_version)?;

        self.value = match mutation {
            Mutation::Replace(value) => value,
            Mutation::Merge(delta) => shallow_merge(&self.value, delta),
        };
        self.version += 1;

        Ok(())
    }

    pub fn snapshot(&self) -> KeyValueRecord {
        KeyValueRecord {
            key: self.key.clone(),
            value: self.value.clone(),
            version: self.version,
        }
    }

    fn ensure_version(&self, expected_version: Option<u64>) -> Result<(), StoreError> {
        match expected_version {
            Some(expected) if expected != self.version => Err(StoreError::VersionMismatch {
                key: self.key.clone(),
                expected,
                actual: self.version,
            }),
            _ => Ok(()),
        }
    }
}

/// Guard for a write against a key that does not exist yet: only an
/// omitted expectation or an expectation of 0 may create it.
pub fn ensure_absent(key: &str, expected_version: Option<u64>) -> Result<(), StoreError> {
    match expected_version {
        Some(expected) if expected != 0 => Err(StoreError::VersionMismatch {
            key: key.to_string(),
            expected,
            actual: 0,
        }),
        _ => Ok(()),
    }
}

/// Top-level merge of two objects. Nested objects under a shared key are
/// replaced, not merged. If either side is not an object, `delta` wins.
pub fn shallow_merge(current: &Value, delta: Value) -> Value {
    match (current, delta) {
        (Value::Object(existing), Value::Object(changes)) => {
            let mut merged = existing.clone();
            for (field, value) in changes {
                merged.insert(field, value);
            }
            Value::Object(merged)
        }
        (_, delta) => delta,
    }
}
