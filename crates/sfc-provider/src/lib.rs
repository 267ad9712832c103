//! SFC Provider - Service Function Path lifecycle
//!
//! Keeps service function paths consistent with the chains they instantiate
//! and the functions they traverse:
//! - Allocates unique path IDs
//! - Synthesizes reverse paths for symmetric chains
//! - Maintains a function -> path back-reference index
//! - Cascades path deletion when a function is removed
//!
//! All operations run as commands on an async executor with per-entity
//! ordering.
//!
//! # Example
//!
//! ```rust,ignore
//! use sfc_datastore::MemoryDataStore;
//! use sfc_provider::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), SfcError> {
//! let provider = SfcProvider::new(Arc::new(MemoryDataStore::new()), ProviderConfig::new())?;
//!
//! let chain = ServiceFunctionChain::new("C1")
//!     .with_function(SfcServiceFunction::new("SF1", ServiceFunctionType::Firewall))
//!     .with_symmetric(true);
//! provider.put_chain(chain).await?;
//!
//! let created = provider.create_path_from_chain("C1", "P1").await?;
//! assert!(created.reverse.is_some());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cascade;
pub mod config;
pub mod error;
pub mod executor;
pub mod index;
pub mod lifecycle;
pub mod model;
pub mod provider;
pub mod repository;

pub use cascade::CascadeDeleteHandler;
pub use config::{ProviderConfig, MAX_PATH_ID};
pub use error::{SfcError, SfcResult};
pub use executor::{
    Command, CommandExecutor, CommandHandle, CommandOutput, EntityKey, ExecutorStats,
};
pub use lifecycle::{is_default_service_path, reverse_hops, CreatedPath, PathLifecycleManager};
pub use model::{
    Entity, ServiceFunction, ServiceFunctionChain, ServiceFunctionPath, ServiceFunctionPaths,
    ServiceFunctionState, ServiceFunctionType, ServicePathHop, SfDataPlaneLocator,
    SfcServiceFunction, TransportType,
};
pub use provider::{ProviderServices, SfcProvider};
pub use repository::{
    ChainRepository, FunctionRepository, FunctionStateRepository, PathRepository, Repository,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the SFC provider
    pub use crate::{
        Command, CommandOutput, CreatedPath, ProviderConfig, ServiceFunction,
        ServiceFunctionChain, ServiceFunctionPath, ServiceFunctionPaths, ServiceFunctionType,
        ServicePathHop, SfcError, SfcProvider, SfcResult, SfcServiceFunction, TransportType,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
