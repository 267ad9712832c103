//! In-memory key-tree backend
//!
//! Used by tests and the `sfcctl` tool. Commits are applied under one write
//! lock, so every commit is atomic and linearizable.

use crate::address::{Address, Partition};
use crate::error::StoreError;
use crate::store::{entry_key, validate_put, DataStore, WriteOp};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Container contents keyed by entry name
type Entries = BTreeMap<String, Value>;

/// In-memory [`DataStore`]
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    /// (partition, container) -> entries; presence means the container exists
    tree: RwLock<BTreeMap<(Partition, String), Entries>>,
    /// Pending injected commit failures
    injected_failures: AtomicUsize,
    /// Successful commits
    commits: AtomicU64,
}

impl MemoryDataStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail with `StoreError::CommitRejected`
    pub fn fail_next_commits(&self, count: usize) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Number of successful commits so far
    #[inline]
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of entries in a container
    #[must_use]
    pub fn entry_count(&self, partition: Partition, container: &str) -> usize {
        self.tree
            .read()
            .get(&(partition, container.to_string()))
            .map_or(0, BTreeMap::len)
    }

    fn take_injected_failure(&self) -> bool {
        self.injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn apply(tree: &mut BTreeMap<(Partition, String), Entries>, op: WriteOp) {
        match op {
            WriteOp::Put {
                partition,
                address,
                value,
            } => {
                let slot = (partition, address.container_name().to_string());
                match address.key() {
                    Some(key) => {
                        tree.entry(slot).or_default().insert(key.to_string(), value);
                    }
                    None => {
                        let entries = value
                            .as_array()
                            .into_iter()
                            .flatten()
                            .filter_map(|e| entry_key(e).map(|k| (k.to_string(), e.clone())))
                            .collect();
                        tree.insert(slot, entries);
                    }
                }
            }
            WriteOp::Delete { partition, address } => {
                let slot = (partition, address.container_name().to_string());
                match address.key() {
                    Some(key) => {
                        if let Some(entries) = tree.get_mut(&slot) {
                            entries.remove(key);
                        }
                    }
                    None => {
                        tree.remove(&slot);
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl DataStore for MemoryDataStore {
    async fn read(
        &self,
        partition: Partition,
        address: &Address,
    ) -> Result<Option<Value>, StoreError> {
        let tree = self.tree.read();
        let Some(entries) = tree.get(&(partition, address.container_name().to_string())) else {
            return Ok(None);
        };
        Ok(match address.key() {
            Some(key) => entries.get(key).cloned(),
            None => Some(Value::Array(entries.values().cloned().collect())),
        })
    }

    async fn commit(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        for op in &ops {
            if let WriteOp::Put { address, value, .. } = op {
                validate_put(address, value)?;
            }
        }
        if self.take_injected_failure() {
            tracing::debug!(ops = ops.len(), "rejecting commit (injected)");
            return Err(StoreError::CommitRejected("injected failure".to_string()));
        }

        let mut tree = self.tree.write();
        for op in ops {
            Self::apply(&mut tree, op);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
