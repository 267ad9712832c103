//! Record repositories
//!
//! [`Repository`] wraps store transactions into record-shaped CRUD calls for
//! any [`Entity`]. Each public operation is one transaction. The `*_in` and
//! `stage_*` helpers work inside a caller-owned transaction so that lifecycle
//! and cascade logic can bundle several records into one atomic commit.

use crate::error::SfcResult;
use crate::model::{
    Entity, ServiceFunction, ServiceFunctionChain, ServiceFunctionPath, ServiceFunctionPaths,
    ServiceFunctionState,
};
use sfc_datastore::{DataStore, ReadWriteTransaction};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// CRUD over one record type
pub struct Repository<E: Entity> {
    store: Arc<dyn DataStore>,
    _entity: PhantomData<fn() -> E>,
}

/// Paths in the configuration partition
pub type PathRepository = Repository<ServiceFunctionPath>;
/// Chains in the configuration partition
pub type ChainRepository = Repository<ServiceFunctionChain>;
/// Functions in the configuration partition
pub type FunctionRepository = Repository<ServiceFunction>;
/// Back-reference entries in the operational partition
pub type FunctionStateRepository = Repository<ServiceFunctionState>;

impl<E: Entity> Repository<E> {
    /// Create repository over `store`
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// Write a whole record, overwriting any previous one
    ///
    /// # Returns
    /// `true` once committed
    ///
    /// # Errors
    /// - `SfcError::Store` if the commit fails
    pub async fn put(&self, record: &E) -> SfcResult<bool> {
        let mut tx = self.transaction();
        Self::stage_put(&mut tx, record)?;
        tx.commit().await?;
        tracing::debug!(container = %E::CONTAINER, name = record.name(), "record written");
        Ok(true)
    }

    /// Read a record, `None` if absent
    pub async fn read(&self, name: &str) -> SfcResult<Option<E>> {
        Self::read_in(&self.transaction(), name).await
    }

    /// Read the whole container, empty if absent
    pub async fn read_all(&self) -> SfcResult<Vec<E>> {
        Self::read_all_in(&self.transaction()).await
    }

    /// Delete a record
    ///
    /// # Returns
    /// `true` if the record existed and was removed, `false` if it was absent
    pub async fn delete(&self, name: &str) -> SfcResult<bool> {
        let mut tx = self.transaction();
        if Self::read_in(&tx, name).await?.is_none() {
            return Ok(false);
        }
        Self::stage_delete(&mut tx, name);
        tx.commit().await?;
        tracing::debug!(container = %E::CONTAINER, name, "record deleted");
        Ok(true)
    }

    /// Overwrite the whole container
    pub async fn put_all(&self, records: &[E]) -> SfcResult<bool> {
        let mut tx = self.transaction();
        Self::stage_put_all(&mut tx, records)?;
        tx.commit().await?;
        tracing::debug!(container = %E::CONTAINER, count = records.len(), "container written");
        Ok(true)
    }

    /// Open a transaction on this repository's store
    #[inline]
    #[must_use]
    pub fn transaction(&self) -> ReadWriteTransaction {
        ReadWriteTransaction::new(self.store.clone())
    }

    /// Read a record inside `tx`
    pub async fn read_in(tx: &ReadWriteTransaction, name: &str) -> SfcResult<Option<E>> {
        Ok(tx.read_typed(E::PARTITION, &E::address(name)).await?)
    }

    /// Read all records inside `tx`
    pub async fn read_all_in(tx: &ReadWriteTransaction) -> SfcResult<Vec<E>> {
        Ok(tx
            .read_typed::<Vec<E>>(E::PARTITION, &E::CONTAINER)
            .await?
            .unwrap_or_default())
    }

    /// Stage a record write
    pub fn stage_put(tx: &mut ReadWriteTransaction, record: &E) -> SfcResult<()> {
        tx.put_typed(E::PARTITION, E::address(record.name()), record)?;
        Ok(())
    }

    /// Stage a container overwrite
    pub fn stage_put_all(tx: &mut ReadWriteTransaction, records: &[E]) -> SfcResult<()> {
        tx.put_typed(E::PARTITION, E::CONTAINER, &records)?;
        Ok(())
    }

    /// Stage a record delete
    pub fn stage_delete(tx: &mut ReadWriteTransaction, name: &str) {
        tx.delete(E::PARTITION, E::address(name));
    }
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self::new(self.store.clone())
    }
}

impl<E: Entity> fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("container", &E::CONTAINER.to_string())
            .finish_non_exhaustive()
    }
}

impl Repository<ServiceFunctionPath> {
    /// Write a path under CONFIGURATION
    pub async fn put_path(&self, path: &ServiceFunctionPath) -> SfcResult<bool> {
        self.put(path).await
    }

    /// Read a path by name
    pub async fn read_path(&self, name: &str) -> SfcResult<Option<ServiceFunctionPath>> {
        self.read(name).await
    }

    /// Read every path
    pub async fn read_all_paths(&self) -> SfcResult<Vec<ServiceFunctionPath>> {
        self.read_all().await
    }

    /// Delete a path by name
    pub async fn delete_path(&self, name: &str) -> SfcResult<bool> {
        self.delete(name).await
    }

    /// Overwrite the paths container
    pub async fn put_all_paths(&self, paths: &ServiceFunctionPaths) -> SfcResult<bool> {
        self.put_all(&paths.service_function_path).await
    }
}

impl Repository<ServiceFunctionChain> {
    /// Write a chain under CONFIGURATION
    pub async fn put_chain(&self, chain: &ServiceFunctionChain) -> SfcResult<bool> {
        self.put(chain).await
    }

    /// Read a chain by name
    pub async fn read_chain(&self, name: &str) -> SfcResult<Option<ServiceFunctionChain>> {
        self.read(name).await
    }

    /// Read every chain
    pub async fn read_all_chains(&self) -> SfcResult<Vec<ServiceFunctionChain>> {
        self.read_all().await
    }

    /// Delete a chain by name
    pub async fn delete_chain(&self, name: &str) -> SfcResult<bool> {
        self.delete(name).await
    }

    /// Overwrite the chains container
    pub async fn put_all_chains(&self, chains: &[ServiceFunctionChain]) -> SfcResult<bool> {
        self.put_all(chains).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SfcError;
    use crate::model::TransportType;
    use sfc_datastore::MemoryDataStore;

    fn repo() -> (Arc<MemoryDataStore>, PathRepository) {
        let store = Arc::new(MemoryDataStore::new());
        (store.clone(), PathRepository::new(store))
    }

    #[tokio::test]
    async fn put_then_read_returns_same_path() {
        let (_, paths) = repo();
        let path = ServiceFunctionPath::new("SFP1")
            .with_chain("C1")
            .with_path_id(7)
            .with_transport(TransportType::Mpls)
            .with_starting_index(200);

        assert!(paths.put_path(&path).await.unwrap());
        assert_eq!(paths.read_path("SFP1").await.unwrap(), Some(path));
    }

    #[tokio::test]
    async fn read_missing_is_none() {
        let (_, paths) = repo();
        assert!(paths.read_path("nope").await.unwrap().is_none());
        assert!(paths.read_all_paths().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let (_, paths) = repo();
        paths.put_path(&ServiceFunctionPath::new("SFP1")).await.unwrap();

        assert!(paths.delete_path("SFP1").await.unwrap());
        assert!(!paths.delete_path("SFP1").await.unwrap());
    }

    #[tokio::test]
    async fn put_all_replaces_container() {
        let (_, paths) = repo();
        paths.put_path(&ServiceFunctionPath::new("old")).await.unwrap();

        let container = ServiceFunctionPaths::new(vec![
            ServiceFunctionPath::new("b"),
            ServiceFunctionPath::new("a"),
        ]);
        assert!(paths.put_all_paths(&container).await.unwrap());

        let names: Vec<_> = paths
            .read_all_paths()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_error() {
        let (store, paths) = repo();
        store.fail_next_commits(1);

        let err = paths
            .put_path(&ServiceFunctionPath::new("SFP1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SfcError::Store(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn chain_repository_mirrors_paths() {
        let store = Arc::new(MemoryDataStore::new());
        let chains = ChainRepository::new(store);
        let chain = ServiceFunctionChain::new("C1").with_symmetric(true);

        assert!(chains.put_chain(&chain).await.unwrap());
        assert_eq!(chains.read_chain("C1").await.unwrap(), Some(chain));
        assert_eq!(chains.read_all_chains().await.unwrap().len(), 1);
        assert!(chains.delete_chain("C1").await.unwrap());
        assert!(!chains.delete_chain("C1").await.unwrap());
    }
}
