//! Store contract
//!
//! [`DataStore`] is the backend seam: point reads plus atomic multi-operation
//! commits. Higher layers stage writes in a
//! [`ReadWriteTransaction`](crate::ReadWriteTransaction).

use crate::address::{Address, Partition, KEY_LEAF};
use crate::error::StoreError;
use serde_json::Value;
use std::fmt;

/// A staged write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the node at `address`
    Put {
        /// Target partition
        partition: Partition,
        /// Container or entry address
        address: Address,
        /// Entry object, or array of entries for a container
        value: Value,
    },
    /// Remove the node at `address` (no-op when absent)
    Delete {
        /// Target partition
        partition: Partition,
        /// Container or entry address
        address: Address,
    },
}

impl WriteOp {
    /// Partition the operation targets
    #[inline]
    #[must_use]
    pub fn partition(&self) -> Partition {
        match self {
            Self::Put { partition, .. } | Self::Delete { partition, .. } => *partition,
        }
    }

    /// Address the operation targets
    #[inline]
    #[must_use]
    pub fn address(&self) -> &Address {
        match self {
            Self::Put { address, .. } | Self::Delete { address, .. } => address,
        }
    }
}

/// Transactional key-tree backend
///
/// Implementations must apply every operation of a `commit` or none of them,
/// and must make committed writes visible to every later `read`.
#[async_trait::async_trait]
pub trait DataStore: Send + Sync + fmt::Debug {
    /// Read the node at `address`
    ///
    /// Container reads return a JSON array of entries ordered by key.
    async fn read(&self, partition: Partition, address: &Address)
        -> Result<Option<Value>, StoreError>;

    /// Atomically apply `ops` in order
    async fn commit(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;
}

/// Key leaf of a list entry
#[inline]
#[must_use]
pub fn entry_key(value: &Value) -> Option<&str> {
    value.get(KEY_LEAF).and_then(Value::as_str)
}

/// Check that `value` has the shape required at `address`
///
/// # Errors
/// - `StoreError::MalformedContainer` if a container payload is not an array
///   of keyed records or repeats a key
/// - `StoreError::KeyMismatch` if an entry's key leaf differs from its address
pub fn validate_put(address: &Address, value: &Value) -> Result<(), StoreError> {
    match address.key() {
        Some(key) => {
            let found = entry_key(value);
            if found != Some(key) {
                return Err(StoreError::KeyMismatch {
                    address: address.to_string(),
                    found: found.map(str::to_string),
                });
            }
            Ok(())
        }
        None => {
            let malformed = |reason: &str| StoreError::MalformedContainer {
                address: address.to_string(),
                reason: reason.to_string(),
            };
            let entries = value
                .as_array()
                .ok_or_else(|| malformed("expected a list"))?;
            let mut seen = std::collections::BTreeSet::new();
            for entry in entries {
                let key = entry_key(entry).ok_or_else(|| malformed("entry without key leaf"))?;
                if !seen.insert(key) {
                    return Err(malformed("duplicate entry key"));
                }
            }
            Ok(())
        }
    }
}

/// Insert or replace `entry` in a key-ordered list
pub(crate) fn upsert_entry(entries: &mut Vec<Value>, entry: Value) {
    let key = entry_key(&entry).map(str::to_string);
    match entries.binary_search_by(|e| entry_key(e).cmp(&key.as_deref())) {
        Ok(idx) => entries[idx] = entry,
        Err(idx) => entries.insert(idx, entry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PATHS: Address = Address::container("service-function-paths");

    #[test]
    fn entry_put_requires_matching_key() {
        assert!(validate_put(&PATHS.child("a"), &json!({ "name": "a" })).is_ok());
        assert!(matches!(
            validate_put(&PATHS.child("a"), &json!({ "name": "b" })),
            Err(StoreError::KeyMismatch { .. })
        ));
        assert!(matches!(
            validate_put(&PATHS.child("a"), &json!({ "id": 1 })),
            Err(StoreError::KeyMismatch { found: None, .. })
        ));
    }

    #[test]
    fn container_put_requires_keyed_unique_list() {
        assert!(validate_put(&PATHS, &json!([{ "name": "a" }, { "name": "b" }])).is_ok());
        assert!(validate_put(&PATHS, &json!([])).is_ok());
        assert!(validate_put(&PATHS, &json!({ "name": "a" })).is_err());
        assert!(validate_put(&PATHS, &json!([{ "id": 1 }])).is_err());
        assert!(validate_put(&PATHS, &json!([{ "name": "a" }, { "name": "a" }])).is_err());
    }

    #[test]
    fn upsert_keeps_key_order() {
        let mut entries = vec![json!({ "name": "a" }), json!({ "name": "c" })];
        upsert_entry(&mut entries, json!({ "name": "b" }));
        upsert_entry(&mut entries, json!({ "name": "a", "v": 2 }));

        let keys: Vec<_> = entries.iter().filter_map(entry_key).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(entries[0]["v"], 2);
    }
}
