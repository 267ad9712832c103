//! Read-write transactions
//!
//! A [`ReadWriteTransaction`] stages writes locally and sends them to the
//! backend as one atomic commit. Reads through the transaction see the
//! transaction's own staged writes on top of committed data.

use crate::address::{Address, Partition};
use crate::error::StoreError;
use crate::store::{entry_key, upsert_entry, validate_put, DataStore, WriteOp};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Transaction with read-after-write visibility
#[derive(Debug)]
pub struct ReadWriteTransaction {
    store: Arc<dyn DataStore>,
    staged: Vec<WriteOp>,
}

impl ReadWriteTransaction {
    /// Open a transaction against `store`
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            staged: Vec::new(),
        }
    }

    /// Read a node, including this transaction's staged writes
    pub async fn read(
        &self,
        partition: Partition,
        address: &Address,
    ) -> Result<Option<Value>, StoreError> {
        let committed = self.store.read(partition, address).await?;
        Ok(overlay(partition, address, committed, &self.staged))
    }

    /// Read and decode a node
    ///
    /// # Errors
    /// - `StoreError::Codec` if the stored value does not decode as `T`
    pub async fn read_typed<T: DeserializeOwned>(
        &self,
        partition: Partition,
        address: &Address,
    ) -> Result<Option<T>, StoreError> {
        self.read(partition, address)
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(StoreError::from)
    }

    /// Stage a put
    ///
    /// # Errors
    /// Shape errors from [`validate_put`] are reported at staging time.
    pub fn put(
        &mut self,
        partition: Partition,
        address: Address,
        value: Value,
    ) -> Result<(), StoreError> {
        validate_put(&address, &value)?;
        self.staged.push(WriteOp::Put {
            partition,
            address,
            value,
        });
        Ok(())
    }

    /// Encode and stage a put
    pub fn put_typed<T: Serialize>(
        &mut self,
        partition: Partition,
        address: Address,
        value: &T,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.put(partition, address, value)
    }

    /// Stage a delete
    pub fn delete(&mut self, partition: Partition, address: Address) {
        self.staged.push(WriteOp::Delete { partition, address });
    }

    /// Number of staged operations
    #[inline]
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Commit all staged operations atomically
    ///
    /// An empty transaction commits without touching the backend.
    pub async fn commit(self) -> Result<(), StoreError> {
        if self.staged.is_empty() {
            return Ok(());
        }
        tracing::debug!(ops = self.staged.len(), "committing transaction");
        self.store.commit(self.staged).await
    }
}

/// Replay staged `ops` touching `target` over its committed value
pub(crate) fn overlay(
    partition: Partition,
    target: &Address,
    mut current: Option<Value>,
    ops: &[WriteOp],
) -> Option<Value> {
    for op in ops.iter().filter(|op| op.partition() == partition) {
        let address = op.address();
        match op {
            WriteOp::Put { value, .. } if address == target => current = Some(value.clone()),
            WriteOp::Put { value, .. } if address.contains(target) => {
                current = value
                    .as_array()
                    .and_then(|entries| entries.iter().find(|e| entry_key(e) == target.key()))
                    .cloned();
            }
            WriteOp::Put { value, .. } if target.contains(address) => {
                let mut entries = match current.take() {
                    Some(Value::Array(entries)) => entries,
                    _ => Vec::new(),
                };
                upsert_entry(&mut entries, value.clone());
                current = Some(Value::Array(entries));
            }
            WriteOp::Delete { .. } if address == target || address.contains(target) => {
                current = None;
            }
            WriteOp::Delete { .. } if target.contains(address) => {
                if let Some(Value::Array(entries)) = current.as_mut() {
                    entries.retain(|e| entry_key(e) != address.key());
                }
            }
            _ => {}
        }
    }
    current
}
