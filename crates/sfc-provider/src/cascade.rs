//! Cascade deletion of paths when a service function goes away
//!
//! A function moving PRESENT -> ABSENT takes every path in its back-reference
//! entry (and each such path's symmetric partner) with it. The removals, the
//! index cleanup and, for [`CascadeDeleteHandler::delete_function`], the
//! function record itself are committed in one transaction.

use crate::error::SfcResult;
use crate::lifecycle::{self, PathLifecycleManager};
use crate::model::ServiceFunction;
use crate::repository::{FunctionRepository, FunctionStateRepository, PathRepository};
use sfc_datastore::ReadWriteTransaction;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Removes paths that depend on a function
#[derive(Debug, Clone)]
pub struct CascadeDeleteHandler {
    lifecycle: Arc<PathLifecycleManager>,
}

impl CascadeDeleteHandler {
    /// Create handler sharing the lifecycle manager's path lock
    #[inline]
    #[must_use]
    pub fn new(lifecycle: Arc<PathLifecycleManager>) -> Self {
        Self { lifecycle }
    }

    /// Delete every path referencing `function`
    ///
    /// A function without a state entry has nothing to remove and succeeds.
    /// Paths named by the entry that no longer exist are dropped from every
    /// index entry.
    ///
    /// # Returns
    /// `true` once all referencing paths are gone
    ///
    /// # Errors
    /// - `SfcError::Store` if a read or the commit fails; nothing is removed
    pub async fn delete_service_path_containing_function(
        &self,
        function: &ServiceFunction,
    ) -> SfcResult<bool> {
        let _guard = self.lifecycle.lock_paths().await;
        let mut tx = self.lifecycle.transaction();

        let removed = self.stage_cascade(&mut tx, &function.name).await?;
        tx.commit().await?;

        tracing::info!(
            function = %function.name,
            removed = removed.len(),
            "paths containing service function deleted"
        );
        Ok(true)
    }

    /// Delete a function record and every path depending on it
    ///
    /// # Returns
    /// `true` if the function record existed
    pub async fn delete_function(&self, name: &str) -> SfcResult<bool> {
        let _guard = self.lifecycle.lock_paths().await;
        let mut tx = self.lifecycle.transaction();

        let existed = FunctionRepository::read_in(&tx, name).await?.is_some();
        let removed = self.stage_cascade(&mut tx, name).await?;
        FunctionRepository::stage_delete(&mut tx, name);
        tx.commit().await?;

        tracing::info!(
            function = name,
            existed,
            removed = removed.len(),
            "service function deleted"
        );
        Ok(existed)
    }

    async fn stage_cascade(
        &self,
        tx: &mut ReadWriteTransaction,
        function: &str,
    ) -> SfcResult<BTreeSet<String>> {
        let mut removed = BTreeSet::new();
        let Some(state) = FunctionStateRepository::read_in(tx, function).await? else {
            tracing::debug!(function, "no paths reference service function");
            return Ok(removed);
        };

        for path_name in &state.sfp {
            if removed.contains(path_name) {
                continue;
            }
            match PathRepository::read_in(tx, path_name).await? {
                Some(path) => lifecycle::stage_removal(tx, path, &mut removed).await?,
                None => {
                    tracing::warn!(
                        function,
                        path = %path_name,
                        "back-reference names a missing path; clearing it"
                    );
                    lifecycle::stage_path_delete(tx, path_name).await?;
                }
            }
        }

        FunctionStateRepository::stage_delete(tx, function);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::model::{
        ServiceFunctionChain, ServiceFunctionPath, ServiceFunctionState, ServiceFunctionType,
        SfcServiceFunction,
    };
    use sfc_datastore::MemoryDataStore;

    fn setup() -> (Arc<MemoryDataStore>, Arc<PathLifecycleManager>, CascadeDeleteHandler) {
        let store = Arc::new(MemoryDataStore::new());
        let lifecycle = Arc::new(PathLifecycleManager::new(
            store.clone(),
            Arc::new(ProviderConfig::default()),
        ));
        let cascade = CascadeDeleteHandler::new(lifecycle.clone());
        (store, lifecycle, cascade)
    }

    fn chain(name: &str, members: &[&str]) -> ServiceFunctionChain {
        members.iter().fold(ServiceFunctionChain::new(name), |chain, m| {
            chain.with_function(SfcServiceFunction::new(*m, ServiceFunctionType::Firewall))
        })
    }

    #[tokio::test]
    async fn missing_state_is_vacuous_success() {
        let (_, _, cascade) = setup();
        let function = ServiceFunction::new("SF1");
        assert!(cascade
            .delete_service_path_containing_function(&function)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn empty_state_entry_is_removed() {
        let (store, _, cascade) = setup();
        let states = FunctionStateRepository::new(store);
        states.put(&ServiceFunctionState::new("SF1")).await.unwrap();

        assert!(cascade
            .delete_service_path_containing_function(&ServiceFunction::new("SF1"))
            .await
            .unwrap());
        assert!(states.read("SF1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn removes_only_referencing_paths() {
        let (store, lifecycle, cascade) = setup();
        lifecycle.put_chain(&chain("C1", &["SF1", "SF2"])).await.unwrap();
        lifecycle.put_chain(&chain("C2", &["SF2", "SF3"])).await.unwrap();
        lifecycle.create_path_from_chain("C1", "P1").await.unwrap();
        lifecycle.create_path_from_chain("C1", "P2").await.unwrap();
        lifecycle.create_path_from_chain("C2", "P3").await.unwrap();

        cascade
            .delete_service_path_containing_function(&ServiceFunction::new("SF1"))
            .await
            .unwrap();

        let paths = PathRepository::new(store.clone());
        let names: Vec<_> = paths
            .read_all()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["P3"]);

        // SF2 no longer lists the removed paths
        let states = FunctionStateRepository::new(store);
        let sf2 = states.read("SF2").await.unwrap().unwrap();
        assert_eq!(sf2.sfp.into_iter().collect::<Vec<_>>(), vec!["P3"]);
        assert!(states.read("SF1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_reference_is_skipped() {
        let (store, _, cascade) = setup();
        let mut state = ServiceFunctionState::new("SF1");
        state.sfp.insert("ghost".to_string());
        FunctionStateRepository::new(store.clone())
            .put(&state)
            .await
            .unwrap();

        assert!(cascade
            .delete_service_path_containing_function(&ServiceFunction::new("SF1"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn missing_path_is_cleared_from_other_entries() {
        let (store, _, cascade) = setup();
        let states = FunctionStateRepository::new(store.clone());
        for function in ["SF1", "SF2"] {
            let mut state = ServiceFunctionState::new(function);
            state.sfp.insert("ghost".to_string());
            state.sfp.insert("P9".to_string());
            states.put(&state).await.unwrap();
        }
        PathRepository::new(store)
            .put(&ServiceFunctionPath::new("P9").with_chain("C9"))
            .await
            .unwrap();

        cascade
            .delete_service_path_containing_function(&ServiceFunction::new("SF1"))
            .await
            .unwrap();

        assert!(states.read("SF1").await.unwrap().is_none());
        assert!(states.read("SF2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_commit_removes_nothing() {
        let (store, lifecycle, cascade) = setup();
        lifecycle.put_chain(&chain("C1", &["SF1"])).await.unwrap();
        lifecycle.create_path_from_chain("C1", "P1").await.unwrap();

        store.fail_next_commits(1);
        assert!(cascade
            .delete_service_path_containing_function(&ServiceFunction::new("SF1"))
            .await
            .is_err());

        let paths = PathRepository::new(store);
        assert!(paths.read("P1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_function_removes_record() {
        let (store, lifecycle, cascade) = setup();
        let functions = FunctionRepository::new(store.clone());
        functions.put(&ServiceFunction::new("SF1")).await.unwrap();
        lifecycle.put_chain(&chain("C1", &["SF1"])).await.unwrap();
        lifecycle.create_path_from_chain("C1", "P1").await.unwrap();

        assert!(cascade.delete_function("SF1").await.unwrap());
        assert!(functions.read("SF1").await.unwrap().is_none());
        assert!(PathRepository::new(store).read("P1").await.unwrap().is_none());
        assert!(!cascade.delete_function("SF1").await.unwrap());
    }
}
