//! SQLite engine for the simulation store
//!
//! Owns everything that touches a `rusqlite::Connection`:
//! - Connection lifecycle with integrity check, quarantine and restore
//! - WAL tuning and a native busy timeout
//! - The prepared statement set, rebuilt on every reconnect
//! - Bounded reads (row ceiling and wall-clock budget)
//! - Retry with exponential backoff for lock contention
//! - Periodic pruning and WAL truncation

pub mod connection;
pub mod guard;
pub mod maintenance;
pub mod ops;
pub mod retry;
pub mod schema;
pub mod statements;

pub use connection::{
    check_integrity, open_read_only, recover_corrupt_store, ConnectReport, ConnectionManager,
    CorruptionRecovery, WalCheckpoint,
};
pub use guard::QueryGuard;
pub use maintenance::{MaintenanceReport, MaintenanceScheduler};
pub use retry::RetryExecutor;
pub use statements::PreparedOp;

use rusqlite::ErrorCode;
use simvault_core::SimVaultError;

/// Map an engine error onto the crate error taxonomy.
///
/// Lock contention becomes [`SimVaultError::Busy`] (the only retryable kind),
/// damaged files become [`SimVaultError::Corruption`], the rest is a plain
/// query failure.
pub fn classify(err: rusqlite::Error) -> SimVaultError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            SimVaultError::Busy(err.to_string())
        }
        Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase) => {
            SimVaultError::Corruption(err.to_string())
        }
        _ => SimVaultError::Query(err.to_string()),
    }
}
