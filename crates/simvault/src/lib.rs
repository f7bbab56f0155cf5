//! simvault: crash-tolerant persistence for agent simulations
//!
//! Keeps simulation state in an embedded SQLite store and keeps the
//! simulation running when storage misbehaves:
//! - **Corruption**: quarantined and restored from the daily backup on open
//! - **Lock contention**: retried with exponential backoff
//! - **Slow reads**: abandoned past a time or row budget
//! - **Lost connection**: probed, reconnected, and eventually circuit-broken,
//!   after which writes are suppressed instead of failing
//! - **Heavy I/O**: backups and startup recovery run on isolated workers
//!
//! # Quick Start
//!
//! ```no_run
//! use simvault::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let vault = SimVault::open(StoreConfig::new("./data/sim.db"))?;
//! let monitor = vault.start_health_monitor();
//!
//! let state = vault.load_latest_state().await?;
//! let tick = state.tick + 1;
//!
//! vault
//!     .write_event(&SimulationEvent::new(tick, "spawn", json!({"agent": "a1"})))
//!     .await?;
//! vault.create_checkpoint(tick).await?;
//! vault.request_backup("daily").await;
//!
//! monitor.shutdown().await;
//! vault.close()?;
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod health;
pub mod prelude;
pub mod recovery;
pub mod store;
mod worker;

// Re-export core types
pub use simvault_core::{
    config::{GuardConfig, HealthConfig, MaintenanceConfig, RetryConfig, StoreConfig, SynchronousMode},
    error::{Result, SimVaultError},
    metrics::{MaintenanceCounters, MetricsRegistry, MetricsSnapshot, OperationMetric, StorageSizes},
    types::{
        AgentPayload, AgentRecord, AgentSummary, CheckpointRecord, DecodedAgent, MemoryRecord,
        NewMemory, RecoveredState, SimulationEvent, StoredEvent, Tick, WriteOutcome,
    },
};

// Re-export the engine
pub use simvault_sqlite::{
    ConnectReport, ConnectionManager, CorruptionRecovery, MaintenanceReport, QueryGuard,
    RetryExecutor, WalCheckpoint,
};

// Re-export main types from this crate
pub use backup::{BackupCoordinator, BackupOutcome, BackupReport, BackupRequest};
pub use health::{HealthMonitor, HealthMonitorHandle, HealthPhase, HealthState};
pub use recovery::RecoveryLoader;
pub use store::SimVault;
