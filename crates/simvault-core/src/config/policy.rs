use crate::error::{Result, SimVaultError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits enforced on bounded reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Wall-clock budget for a single read
    /// Default: 2000
    #[serde(default = "default_guard_timeout_ms")]
    pub timeout_ms: u64,

    /// Row ceiling for a single read
    /// Default: 20000
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// How many rows are fetched between abandonment checks
    /// Default: 100
    #[serde(default = "default_check_interval_rows")]
    pub check_interval_rows: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_guard_timeout_ms(),
            max_rows: default_max_rows(),
            check_interval_rows: default_check_interval_rows(),
        }
    }
}

impl GuardConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.check_interval_rows == 0 {
            return Err(SimVaultError::Config(
                "guard.check_interval_rows must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn default_guard_timeout_ms() -> u64 {
    2000
}

fn default_max_rows() -> usize {
    20_000
}

fn default_check_interval_rows() -> usize {
    100
}

/// Retry policy for transient lock contention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    /// Default: 3
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the `base * 2^attempt` backoff
    /// Default: 200
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Delay slept after failed attempt number `attempt` (1-based): 400ms, 800ms, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << attempt.min(20)))
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(SimVaultError::Config(
                "retry.max_attempts must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

/// Health probing and reconnect policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Probe period
    /// Default: 30000
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Reconnect attempts granted before the circuit opens
    /// Default: 5
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Default: 1000
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Default: 30000
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// Resident memory above which each probe warns
    /// Default: 1.5GB
    #[serde(default = "default_memory_high_water_bytes")]
    pub memory_high_water_bytes: u64,

    /// Every Nth probe logs a consolidated metrics snapshot
    /// Default: 10
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            memory_high_water_bytes: default_memory_high_water_bytes(),
            snapshot_every: default_snapshot_every(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Delay before reconnect attempt `attempt` (1-based): 2s, 4s, 8s, 16s, then capped.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let raw = self
            .reconnect_base_ms
            .saturating_mul(1u64 << attempt.min(20));
        Duration::from_millis(raw.min(self.reconnect_max_ms))
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_reconnect_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.reconnect_base_ms = base_ms;
        self.reconnect_max_ms = max_ms;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(SimVaultError::Config(
                "health.interval_ms must be greater than zero".into(),
            ));
        }
        if self.snapshot_every == 0 {
            return Err(SimVaultError::Config(
                "health.snapshot_every must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn default_interval_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_memory_high_water_bytes() -> u64 {
    1536 * 1024 * 1024
}

fn default_snapshot_every() -> u64 {
    10
}

/// Pruning and log compaction cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Checkpoints between maintenance runs
    /// Default: 100
    #[serde(default = "default_prune_interval")]
    pub prune_interval: u32,

    /// Events older than `tick - event_retention_ticks` are deleted
    /// Default: 1000
    #[serde(default = "default_event_retention_ticks")]
    pub event_retention_ticks: i64,

    /// Memories older than `tick - memory_retention_ticks` are deleted
    /// Default: 5000
    #[serde(default = "default_memory_retention_ticks")]
    pub memory_retention_ticks: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            prune_interval: default_prune_interval(),
            event_retention_ticks: default_event_retention_ticks(),
            memory_retention_ticks: default_memory_retention_ticks(),
        }
    }
}

impl MaintenanceConfig {
    pub fn with_prune_interval(mut self, prune_interval: u32) -> Self {
        self.prune_interval = prune_interval;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.prune_interval == 0 {
            return Err(SimVaultError::Config(
                "maintenance.prune_interval must be greater than zero".into(),
            ));
        }
        if self.event_retention_ticks < 0 || self.memory_retention_ticks < 0 {
            return Err(SimVaultError::Config(
                "maintenance retention windows must not be negative".into(),
            ));
        }
        Ok(())
    }
}

fn default_prune_interval() -> u32 {
    100
}

fn default_event_retention_ticks() -> i64 {
    1000
}

fn default_memory_retention_ticks() -> i64 {
    5000
}
