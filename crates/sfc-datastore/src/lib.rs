//! SFC Datastore - transactional key-tree store
//!
//! The store holds JSON records in a two-level tree:
//! - A container (`service-function-paths`) is a keyed list
//! - An entry (`service-function-paths/SFP1`) is one record of that list
//!
//! Every container exists once per [`Partition`]. Lists are keyed by the
//! record's `name` leaf ([`KEY_LEAF`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use sfc_datastore::{Address, MemoryDataStore, Partition, ReadWriteTransaction};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryDataStore::new());
//! let mut tx = ReadWriteTransaction::new(store.clone());
//! tx.put(
//!     Partition::Configuration,
//!     Address::container("service-function-paths").child("SFP1"),
//!     serde_json::json!({ "name": "SFP1" }),
//! )?;
//! tx.commit().await?;
//! ```

pub mod address;
pub mod error;
pub mod memory;
pub mod store;
pub mod transaction;

pub use address::{Address, Partition, KEY_LEAF};
pub use error::StoreError;
pub use memory::MemoryDataStore;
pub use store::{DataStore, WriteOp};
pub use transaction::ReadWriteTransaction;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
