//! Error types for the datastore

/// Store failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Commit refused by the backend; nothing was applied
    #[error("commit rejected: {0}")]
    CommitRejected(String),

    /// Container payload is not a list of keyed records
    #[error("malformed container payload at {address}: {reason}")]
    MalformedContainer {
        /// Container address
        address: String,
        /// What is wrong with the payload
        reason: String,
    },

    /// Entry payload key leaf does not match its address
    #[error("key mismatch at {address}: payload keyed {found:?}")]
    KeyMismatch {
        /// Entry address
        address: String,
        /// Key found in the payload
        found: Option<String>,
    },

    /// Record could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether retrying the same transaction may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::CommitRejected(_))
    }
}
