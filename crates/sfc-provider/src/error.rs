//! Error types for the SFC provider
//!
//! Absence is never an error: reads of missing records return `None` and
//! deletes of missing records return `false`.

use sfc_datastore::StoreError;

/// Main provider error type
#[derive(Debug, thiserror::Error)]
pub enum SfcError {
    /// Path names a chain that does not exist
    #[error("service function chain not found: {chain}")]
    ChainNotFound {
        /// Missing chain name
        chain: String,
    },

    /// Path has no chain reference
    #[error("service function path {path} has no service chain name")]
    MissingChainName {
        /// Path name
        path: String,
    },

    /// Chain lists the same member twice
    #[error("chain {chain} lists service function {member} more than once")]
    DuplicateChainMember {
        /// Chain name
        chain: String,
        /// Repeated member name
        member: String,
    },

    /// Explicit path ID already taken by another path
    #[error("path id {path_id} requested by {path} is already used by {owner}")]
    PathIdConflict {
        /// Requested ID
        path_id: u32,
        /// Requesting path
        path: String,
        /// Path holding the ID
        owner: String,
    },

    /// Path or its generated reverse name is held by an unrelated path
    #[error("path {path} collides with symmetric path {partner}")]
    SymmetricPathConflict {
        /// Path being written
        path: String,
        /// Existing path in the way
        partner: String,
    },

    /// No free path ID left in the configured range
    #[error("path id range {min}..={max} exhausted")]
    PathIdExhausted {
        /// Lowest allocatable ID
        min: u32,
        /// Highest allocatable ID
        max: u32,
    },

    /// Underlying store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Executor no longer accepts commands
    #[error("command executor is shut down")]
    ExecutorClosed,

    /// Worker task ended without producing a result
    #[error("command aborted: {0}")]
    CommandAborted(String),

    /// Command produced an output of an unexpected kind
    #[error("unexpected command output: expected {expected}")]
    UnexpectedOutput {
        /// Output kind the caller asked for
        expected: &'static str,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl SfcError {
    /// Check if the caller may retry the same command
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_transient(),
            Self::CommandAborted(_) => true,
            _ => false,
        }
    }

    /// Check if error reports a dangling reference
    #[inline]
    #[must_use]
    pub fn is_reference_error(&self) -> bool {
        matches!(self, Self::ChainNotFound { .. } | Self::MissingChainName { .. })
    }
}

impl From<toml::de::Error> for SfcError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result alias for provider operations
pub type SfcResult<T> = Result<T, SfcError>;
