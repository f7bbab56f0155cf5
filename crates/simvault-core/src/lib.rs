//! simvault core: configuration, errors and record types shared by the
//! simulation persistence layer.
//!
//! The persistence layer keeps simulation state (agents, time-stamped events,
//! agent memories, checkpoints) in an embedded SQLite store and stays available
//! under corruption, lock contention and slow reads:
//! - Connection manager: open, tune, integrity check, quarantine and restore
//! - Query guard: bounded reads (time and row ceilings)
//! - Retry executor: backoff on transient lock contention
//! - Health monitor: probing, reconnect backoff, circuit breaker
//! - Maintenance: periodic pruning and log compaction on checkpoint
//! - Backup / recovery: heavy I/O on isolated workers

pub mod config;
pub mod error;
pub mod metrics;
pub mod observe;
pub mod types;

pub use config::{
    GuardConfig, HealthConfig, MaintenanceConfig, RetryConfig, StoreConfig, SynchronousMode,
};
pub use error::{Result, SimVaultError};
pub use crate::metrics::{
    MaintenanceCounters, MetricsRegistry, MetricsSnapshot, OperationMetric, StorageSizes,
};
pub use types::{
    AgentPayload, AgentRecord, AgentSummary, CheckpointRecord, DecodedAgent, MemoryRecord,
    NewMemory, RecoveredState, SimulationEvent, StoredEvent, Tick, WriteOutcome,
};
