//! simvault Prelude
//!
//! ```
//! use simvault::prelude::*;
//! ```

// Facade and results
pub use crate::{Result, SimVault, SimVaultError, WriteOutcome};

// Configs
pub use crate::{
    GuardConfig, HealthConfig, MaintenanceConfig, RetryConfig, StoreConfig, SynchronousMode,
};

// Records
pub use crate::{
    AgentPayload, AgentRecord, AgentSummary, CheckpointRecord, MemoryRecord, NewMemory,
    RecoveredState, SimulationEvent, StoredEvent, Tick,
};

// Health
pub use crate::{HealthMonitorHandle, HealthPhase, HealthState};

// Backup
pub use crate::{BackupOutcome, BackupReport};

// Metrics
pub use crate::MetricsSnapshot;

// Re-export common external deps
pub use serde::{Deserialize, Serialize};
pub use serde_json::{json, Value};
pub use std::sync::Arc;
pub use tracing;
