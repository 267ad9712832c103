//! Provider context
//!
//! [`SfcProvider`] owns the store handle, the repositories, the lifecycle
//! manager and the command executor. The typed methods submit a command and
//! wait for its result; [`SfcProvider::delete_service_path_containing_function`]
//! is the one call that runs on the caller's task.

use crate::cascade::CascadeDeleteHandler;
use crate::config::ProviderConfig;
use crate::error::SfcResult;
use crate::executor::{Command, CommandExecutor, CommandHandle, CommandOutput, ExecutorStats};
use crate::lifecycle::{CreatedPath, PathLifecycleManager};
use crate::model::{
    ServiceFunction, ServiceFunctionChain, ServiceFunctionPath, ServiceFunctionPaths,
};
use crate::repository::{
    ChainRepository, FunctionRepository, FunctionStateRepository, PathRepository,
};
use sfc_datastore::DataStore;
use std::sync::Arc;

/// Shared services commands run against
#[derive(Debug)]
pub struct ProviderServices {
    /// Validated configuration
    pub config: Arc<ProviderConfig>,
    /// Backing store
    pub store: Arc<dyn DataStore>,
    /// Path records
    pub paths: PathRepository,
    /// Chain records
    pub chains: ChainRepository,
    /// Function records
    pub functions: FunctionRepository,
    /// Back-reference entries
    pub function_state: FunctionStateRepository,
    /// Path and chain lifecycle rules
    pub lifecycle: Arc<PathLifecycleManager>,
    /// Function removal cascade
    pub cascade: CascadeDeleteHandler,
}

impl ProviderServices {
    /// Wire services over `store`
    #[must_use]
    pub fn new(store: Arc<dyn DataStore>, config: ProviderConfig) -> Self {
        let config = Arc::new(config);
        let lifecycle = Arc::new(PathLifecycleManager::new(store.clone(), config.clone()));

        Self {
            paths: PathRepository::new(store.clone()),
            chains: ChainRepository::new(store.clone()),
            functions: FunctionRepository::new(store.clone()),
            function_state: FunctionStateRepository::new(store.clone()),
            cascade: CascadeDeleteHandler::new(lifecycle.clone()),
            lifecycle,
            config,
            store,
        }
    }
}

/// SFC provider context
#[derive(Debug)]
pub struct SfcProvider {
    services: Arc<ProviderServices>,
    executor: CommandExecutor,
}

impl SfcProvider {
    /// Create provider over `store`
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    /// - `SfcError::Config` if `config` fails validation
    pub fn new(store: Arc<dyn DataStore>, config: ProviderConfig) -> SfcResult<Self> {
        config.validate()?;
        let worker_limit = config.worker_limit;
        let services = Arc::new(ProviderServices::new(store, config));
        let executor = CommandExecutor::new(services.clone(), worker_limit);

        tracing::info!(worker_limit, "sfc provider started");
        Ok(Self { services, executor })
    }

    /// Shared services
    #[inline]
    #[must_use]
    pub fn services(&self) -> &Arc<ProviderServices> {
        &self.services
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.services.config
    }

    /// Submit a command without waiting
    pub fn submit(&self, command: Command) -> CommandHandle {
        self.executor.submit(command)
    }

    /// Submit a command and wait for its result
    pub async fn execute(&self, command: Command) -> SfcResult<CommandOutput> {
        self.executor.execute(command).await
    }

    /// Executor statistics
    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        self.executor.stats()
    }

    /// Stop accepting commands
    pub fn shutdown(&self) {
        self.executor.shutdown();
    }

    /// Create or update a path
    pub async fn create_path(&self, path: ServiceFunctionPath) -> SfcResult<CreatedPath> {
        self.executor
            .execute(Command::CreatePath(path))
            .await?
            .into_created()
    }

    /// Create a path on an existing chain
    pub async fn create_path_from_chain(
        &self,
        chain_name: &str,
        path_name: &str,
    ) -> SfcResult<CreatedPath> {
        self.executor
            .execute(Command::CreatePathFromChain {
                chain_name: chain_name.to_string(),
                path_name: path_name.to_string(),
            })
            .await?
            .into_created()
    }

    /// Read a path by name
    pub async fn read_path(&self, name: &str) -> SfcResult<Option<ServiceFunctionPath>> {
        self.executor
            .execute(Command::ReadPath(name.to_string()))
            .await?
            .into_path()
    }

    /// Read every path
    pub async fn read_all_paths(&self) -> SfcResult<Vec<ServiceFunctionPath>> {
        self.executor
            .execute(Command::ReadAllPaths)
            .await?
            .into_paths()
    }

    /// Delete a path and its symmetric partner
    pub async fn delete_path(&self, name: &str) -> SfcResult<bool> {
        self.executor
            .execute(Command::DeletePath(name.to_string()))
            .await?
            .into_deleted()
    }

    /// Overwrite every path
    pub async fn put_all_paths(&self, paths: ServiceFunctionPaths) -> SfcResult<bool> {
        self.executor
            .execute(Command::PutAllPaths(paths))
            .await?
            .into_written()
    }

    /// Delete every path referencing `function` on the caller's task
    pub async fn delete_service_path_containing_function(
        &self,
        function: &ServiceFunction,
    ) -> SfcResult<bool> {
        self.services
            .cascade
            .delete_service_path_containing_function(function)
            .await
    }

    /// Delete every path referencing `function` through the executor
    ///
    /// Ordered after earlier commands on the same function.
    pub async fn delete_service_path_containing_function_executor(
        &self,
        function: &ServiceFunction,
    ) -> SfcResult<bool> {
        self.executor
            .execute(Command::DeletePathsForFunction(function.clone()))
            .await?
            .into_written()
    }

    /// Write a chain
    pub async fn put_chain(&self, chain: ServiceFunctionChain) -> SfcResult<bool> {
        self.executor
            .execute(Command::PutChain(chain))
            .await?
            .into_written()
    }

    /// Read a chain by name
    pub async fn read_chain(&self, name: &str) -> SfcResult<Option<ServiceFunctionChain>> {
        self.executor
            .execute(Command::ReadChain(name.to_string()))
            .await?
            .into_chain()
    }

    /// Delete a chain; paths on it are left in place
    pub async fn delete_chain(&self, name: &str) -> SfcResult<bool> {
        self.executor
            .execute(Command::DeleteChain(name.to_string()))
            .await?
            .into_deleted()
    }

    /// Write a function
    pub async fn put_function(&self, function: ServiceFunction) -> SfcResult<bool> {
        self.executor
            .execute(Command::PutFunction(function))
            .await?
            .into_written()
    }

    /// Delete a function and every path depending on it
    pub async fn delete_function(&self, name: &str) -> SfcResult<bool> {
        self.executor
            .execute(Command::DeleteFunction(name.to_string()))
            .await?
            .into_deleted()
    }
}

impl Drop for SfcProvider {
    fn drop(&mut self) {
        self.executor.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SfcError;
    use sfc_datastore::MemoryDataStore;

    #[tokio::test]
    async fn rejects_invalid_config() {
        let store = Arc::new(MemoryDataStore::new());
        let err = SfcProvider::new(store, ProviderConfig::default().with_worker_limit(0))
            .unwrap_err();
        assert!(matches!(err, SfcError::Config(_)));
    }

    #[tokio::test]
    async fn commands_after_shutdown_fail() {
        let provider =
            SfcProvider::new(Arc::new(MemoryDataStore::new()), ProviderConfig::default()).unwrap();
        provider.shutdown();

        assert!(matches!(
            provider.read_all_paths().await,
            Err(SfcError::ExecutorClosed)
        ));
    }
}
