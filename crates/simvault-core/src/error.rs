use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimVaultError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The store could not be opened or the live handle is gone.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store file failed its integrity check. Handled inside
    /// `connect()` by quarantine and restore; never surfaced to callers.
    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Query '{operation}' timed out after {elapsed_ms}ms (limit {timeout_ms}ms)")]
    QueryTimeout {
        operation: String,
        elapsed_ms: u64,
        timeout_ms: u64,
    },

    #[error("Query '{operation}' exceeded row limit: {rows} rows (limit {limit})")]
    RowLimitExceeded {
        operation: String,
        rows: usize,
        limit: usize,
    },

    /// Lock contention that outlived the native busy timeout.
    #[error("Database busy: {0}")]
    Busy(String),

    #[error("Maintenance error: {0}")]
    Maintenance(String),

    /// An isolated worker failed or exited without reporting a result.
    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl SimVaultError {
    /// Whether a retry has a chance of succeeding.
    ///
    /// Only lock contention qualifies; everything else is either permanent
    /// or handled elsewhere (reconnects belong to the health monitor).
    pub fn is_transient(&self) -> bool {
        matches!(self, SimVaultError::Busy(_))
    }

    /// Whether the read was abandoned by the query guard.
    pub fn is_guard_abort(&self) -> bool {
        matches!(
            self,
            SimVaultError::QueryTimeout { .. } | SimVaultError::RowLimitExceeded { .. }
        )
    }
}

impl From<serde_json::Error> for SimVaultError {
    fn from(err: serde_json::Error) -> Self {
        SimVaultError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SimVaultError>;
