//! Command executor
//!
//! Commands are submitted to a dispatcher task and each one runs on its own
//! Tokio task, bounded by a semaphore. The caller gets a [`CommandHandle`]
//! future for the result.
//!
//! # Ordering
//!
//! Commands with the same [`EntityKey`] run one after another in submission
//! order. Commands on different entities, and commands without a key, run
//! concurrently.
//!
//! # Fire-and-forget
//!
//! Dropping a handle does not cancel its command; the result is discarded.

use crate::error::{SfcError, SfcResult};
use crate::lifecycle::CreatedPath;
use crate::model::{
    ServiceFunction, ServiceFunctionChain, ServiceFunctionPath, ServiceFunctionPaths,
};
use crate::provider::ProviderServices;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, Semaphore};

/// Pending ordering barriers kept before finished ones are pruned
const BARRIER_PRUNE_THRESHOLD: usize = 256;

/// A typed provider operation
#[derive(Debug, Clone)]
pub enum Command {
    /// Create or update a path (ID allocation, symmetric synthesis)
    CreatePath(ServiceFunctionPath),
    /// Create a skeleton path on an existing chain
    CreatePathFromChain {
        chain_name: String,
        path_name: String,
    },
    /// Read one path
    ReadPath(String),
    /// Read every path
    ReadAllPaths,
    /// Delete a path and its symmetric partner
    DeletePath(String),
    /// Overwrite every path
    PutAllPaths(ServiceFunctionPaths),
    /// Delete every path referencing a function
    DeletePathsForFunction(ServiceFunction),
    /// Write a chain
    PutChain(ServiceFunctionChain),
    /// Read one chain
    ReadChain(String),
    /// Delete a chain
    DeleteChain(String),
    /// Write a function
    PutFunction(ServiceFunction),
    /// Delete a function and every path depending on it
    DeleteFunction(String),
}

/// Entity a command is ordered against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Path(String),
    Chain(String),
    Function(String),
}

impl Command {
    /// Operation name for logs and statistics
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreatePath(_) => "create-path",
            Self::CreatePathFromChain { .. } => "create-path-from-chain",
            Self::ReadPath(_) => "read-path",
            Self::ReadAllPaths => "read-all-paths",
            Self::DeletePath(_) => "delete-path",
            Self::PutAllPaths(_) => "put-all-paths",
            Self::DeletePathsForFunction(_) => "delete-paths-for-function",
            Self::PutChain(_) => "put-chain",
            Self::ReadChain(_) => "read-chain",
            Self::DeleteChain(_) => "delete-chain",
            Self::PutFunction(_) => "put-function",
            Self::DeleteFunction(_) => "delete-function",
        }
    }

    /// Ordering key, `None` for commands spanning many entities
    #[must_use]
    pub fn entity_key(&self) -> Option<EntityKey> {
        match self {
            Self::CreatePath(path) => Some(EntityKey::Path(path.name.clone())),
            Self::CreatePathFromChain { path_name, .. } => Some(EntityKey::Path(path_name.clone())),
            Self::ReadPath(name) | Self::DeletePath(name) => Some(EntityKey::Path(name.clone())),
            Self::PutChain(chain) => Some(EntityKey::Chain(chain.name.clone())),
            Self::ReadChain(name) | Self::DeleteChain(name) => Some(EntityKey::Chain(name.clone())),
            Self::DeletePathsForFunction(function) | Self::PutFunction(function) => {
                Some(EntityKey::Function(function.name.clone()))
            }
            Self::DeleteFunction(name) => Some(EntityKey::Function(name.clone())),
            Self::ReadAllPaths | Self::PutAllPaths(_) => None,
        }
    }

    async fn run(self, services: &ProviderServices) -> SfcResult<CommandOutput> {
        match self {
            Self::CreatePath(path) => services
                .lifecycle
                .create_path(path)
                .await
                .map(CommandOutput::Created),
            Self::CreatePathFromChain {
                chain_name,
                path_name,
            } => services
                .lifecycle
                .create_path_from_chain(&chain_name, &path_name)
                .await
                .map(CommandOutput::Created),
            Self::ReadPath(name) => services.paths.read_path(&name).await.map(CommandOutput::Path),
            Self::ReadAllPaths => services.paths.read_all_paths().await.map(CommandOutput::Paths),
            Self::DeletePath(name) => services
                .lifecycle
                .delete_path(&name)
                .await
                .map(CommandOutput::Deleted),
            Self::PutAllPaths(paths) => services
                .lifecycle
                .put_all_paths(&paths)
                .await
                .map(CommandOutput::Written),
            Self::DeletePathsForFunction(function) => services
                .cascade
                .delete_service_path_containing_function(&function)
                .await
                .map(CommandOutput::Written),
            Self::PutChain(chain) => services
                .lifecycle
                .put_chain(&chain)
                .await
                .map(CommandOutput::Written),
            Self::ReadChain(name) => services.chains.read_chain(&name).await.map(CommandOutput::Chain),
            Self::DeleteChain(name) => services
                .chains
                .delete_chain(&name)
                .await
                .map(CommandOutput::Deleted),
            Self::PutFunction(function) => services
                .functions
                .put(&function)
                .await
                .map(CommandOutput::Written),
            Self::DeleteFunction(name) => services
                .cascade
                .delete_function(&name)
                .await
                .map(CommandOutput::Deleted),
        }
    }
}

/// Result of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    /// Write committed
    Written(bool),
    /// Delete outcome (`false` if the record was absent)
    Deleted(bool),
    /// Created path pair
    Created(CreatedPath),
    /// Single path read
    Path(Option<ServiceFunctionPath>),
    /// All paths
    Paths(Vec<ServiceFunctionPath>),
    /// Single chain read
    Chain(Option<ServiceFunctionChain>),
}

impl CommandOutput {
    pub fn into_written(self) -> SfcResult<bool> {
        match self {
            Self::Written(ok) => Ok(ok),
            _ => Err(SfcError::UnexpectedOutput { expected: "written" }),
        }
    }

    pub fn into_deleted(self) -> SfcResult<bool> {
        match self {
            Self::Deleted(existed) => Ok(existed),
            _ => Err(SfcError::UnexpectedOutput { expected: "deleted" }),
        }
    }

    pub fn into_created(self) -> SfcResult<CreatedPath> {
        match self {
            Self::Created(created) => Ok(created),
            _ => Err(SfcError::UnexpectedOutput { expected: "created" }),
        }
    }

    pub fn into_path(self) -> SfcResult<Option<ServiceFunctionPath>> {
        match self {
            Self::Path(path) => Ok(path),
            _ => Err(SfcError::UnexpectedOutput { expected: "path" }),
        }
    }

    pub fn into_paths(self) -> SfcResult<Vec<ServiceFunctionPath>> {
        match self {
            Self::Paths(paths) => Ok(paths),
            _ => Err(SfcError::UnexpectedOutput { expected: "paths" }),
        }
    }

    pub fn into_chain(self) -> SfcResult<Option<ServiceFunctionChain>> {
        match self {
            Self::Chain(chain) => Ok(chain),
            _ => Err(SfcError::UnexpectedOutput { expected: "chain" }),
        }
    }
}

/// Future of a submitted command's result
#[derive(Debug)]
#[must_use = "dropping the handle discards the result (the command still runs)"]
pub struct CommandHandle {
    rx: oneshot::Receiver<SfcResult<CommandOutput>>,
}

impl CommandHandle {
    fn ready(result: SfcResult<CommandOutput>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    /// Wait for the result from synchronous code
    ///
    /// Must not be called from a thread driving the executor's runtime.
    pub fn wait_blocking(self) -> SfcResult<CommandOutput> {
        futures::executor::block_on(self)
    }
}

impl Future for CommandHandle {
    type Output = SfcResult<CommandOutput>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(SfcError::CommandAborted(
                    "worker ended without a result".to_string(),
                ))
            })
        })
    }
}

/// Executor statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Commands accepted
    pub submitted: u64,
    /// Commands finished successfully
    pub succeeded: u64,
    /// Commands finished with an error
    pub failed: u64,
    /// Failures per command name
    pub failures_by_command: Vec<(&'static str, u64)>,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    failures_by_command: DashMap<&'static str, u64>,
}

impl Counters {
    fn record(&self, command: &'static str, result: &SfcResult<CommandOutput>) {
        match result {
            Ok(_) => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                *self.failures_by_command.entry(command).or_insert(0) += 1;
            }
        }
    }
}

struct Envelope {
    command: Command,
    reply: oneshot::Sender<SfcResult<CommandOutput>>,
}

/// Async command dispatcher
#[derive(Debug)]
pub struct CommandExecutor {
    sender: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    counters: Arc<Counters>,
}

impl CommandExecutor {
    /// Start the dispatcher
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn new(services: Arc<ProviderServices>, worker_limit: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let permits = Arc::new(Semaphore::new(worker_limit.max(1)));

        tokio::spawn(dispatch(receiver, services, permits, counters.clone()));

        Self {
            sender: Mutex::new(Some(sender)),
            counters,
        }
    }

    /// Submit a command
    ///
    /// After [`shutdown`](Self::shutdown) the handle resolves to
    /// `SfcError::ExecutorClosed`.
    pub fn submit(&self, command: Command) -> CommandHandle {
        let (reply, rx) = oneshot::channel();
        let envelope = Envelope { command, reply };

        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(envelope).is_ok(),
            None => false,
        };
        if !sent {
            return CommandHandle::ready(Err(SfcError::ExecutorClosed));
        }

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        CommandHandle { rx }
    }

    /// Submit a command and wait for its result
    pub async fn execute(&self, command: Command) -> SfcResult<CommandOutput> {
        self.submit(command).await
    }

    /// Stop accepting commands
    ///
    /// Commands already submitted still run to completion.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            tracing::info!("command executor shutting down");
        }
    }

    /// Whether new commands are accepted
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Snapshot of executor statistics
    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        let mut failures_by_command: Vec<_> = self
            .counters
            .failures_by_command
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        failures_by_command.sort_unstable();

        ExecutorStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            failures_by_command,
        }
    }
}

/// Drop barriers whose command has finished
fn prune_barriers(barriers: &mut HashMap<EntityKey, oneshot::Receiver<()>>) {
    barriers.retain(|_, rx| matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)));
}

/// Size at which to prune again, given the size left after a prune
///
/// Doubling keeps pruning amortized when many barriers stay pending.
fn next_prune_at(remaining: usize) -> usize {
    remaining.saturating_mul(2).max(BARRIER_PRUNE_THRESHOLD)
}

/// Dispatcher loop (runs in its own task)
async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<Envelope>,
    services: Arc<ProviderServices>,
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
) {
    // Completion signal of the last command per entity
    let mut barriers: HashMap<EntityKey, oneshot::Receiver<()>> = HashMap::new();
    let mut prune_at = BARRIER_PRUNE_THRESHOLD;

    while let Some(Envelope { command, reply }) = receiver.recv().await {
        let name = command.name();
        let key = command.entity_key();
        tracing::debug!(command = name, key = ?key, "dispatching command");

        let (previous, done) = match key {
            Some(key) => {
                let (done_tx, done_rx) = oneshot::channel();
                (barriers.insert(key, done_rx), Some(done_tx))
            }
            None => (None, None),
        };
        if barriers.len() > prune_at {
            prune_barriers(&mut barriers);
            prune_at = next_prune_at(barriers.len());
        }

        let services = services.clone();
        let permits = permits.clone();
        let counters = counters.clone();
        tokio::spawn(async move {
            if let Some(previous) = previous {
                // Err means the previous command's task died; order is still kept
                let _ = previous.await;
            }

            let result = match permits.acquire_owned().await {
                Ok(_permit) => command.run(&services).await,
                Err(_) => Err(SfcError::ExecutorClosed),
            };
            if let Err(err) = &result {
                tracing::warn!(command = name, error = %err, "command failed");
            }
            counters.record(name, &result);

            if let Some(done) = done {
                let _ = done.send(());
            }
            // Receiver gone means fire-and-forget
            let _ = reply.send(result);
        });
    }

    tracing::debug!("command dispatcher stopped");
}
