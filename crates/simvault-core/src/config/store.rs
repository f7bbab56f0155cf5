use super::policy::{GuardConfig, HealthConfig, MaintenanceConfig, RetryConfig};
use crate::error::{Result, SimVaultError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the rolling backup used for corruption recovery.
pub const DAILY_BACKUP_FILE: &str = "backup_daily.db";

/// Configuration for the simulation store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,

    /// Directory holding backups
    /// Default: `backups/` next to the store file
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// SQLite cache size (in pages, negative = KB)
    /// Default: -64000 (64MB)
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,

    /// Native lock-wait timeout before SQLite reports busy
    /// Default: 3000
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// SQLite synchronous mode
    #[serde(default)]
    pub synchronous: SynchronousMode,

    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SynchronousMode {
    /// Full fsync (safest, slowest)
    Full,
    /// fsync at critical moments; safe under WAL
    #[default]
    Normal,
}

impl SynchronousMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            SynchronousMode::Full => "FULL",
            SynchronousMode::Normal => "NORMAL",
        }
    }
}

fn default_cache_size() -> i32 {
    -64000 // 64MB
}

fn default_busy_timeout_ms() -> u64 {
    3000
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_dir: None,
            cache_size: default_cache_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            synchronous: SynchronousMode::default(),
            guard: GuardConfig::default(),
            retry: RetryConfig::default(),
            health: HealthConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    pub fn with_cache_size(mut self, cache_size: i32) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }

    pub fn with_synchronous(mut self, synchronous: SynchronousMode) -> Self {
        self.synchronous = synchronous;
        self
    }

    pub fn with_guard(mut self, guard: GuardConfig) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    pub fn with_maintenance(mut self, maintenance: MaintenanceConfig) -> Self {
        self.maintenance = maintenance;
        self
    }

    /// Directory backups are written to.
    pub fn backup_dir(&self) -> PathBuf {
        match &self.backup_dir {
            Some(dir) => dir.clone(),
            None => self
                .path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("backups"),
        }
    }

    /// Destination of a backup with the given label (`daily` -> `backup_daily.db`).
    pub fn backup_path(&self, label: &str) -> PathBuf {
        self.backup_dir().join(format!("backup_{}.db", label))
    }

    /// The backup consulted when the live store turns out corrupt.
    pub fn daily_backup_path(&self) -> PathBuf {
        self.backup_dir().join(DAILY_BACKUP_FILE)
    }

    /// Write-ahead-log sidecar of the store file.
    pub fn wal_path(&self) -> PathBuf {
        sidecar(&self.path, "-wal")
    }

    /// Shared-memory sidecar of the store file.
    pub fn shm_path(&self) -> PathBuf {
        sidecar(&self.path, "-shm")
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(SimVaultError::Config("store path is empty".into()));
        }
        if self.path.is_dir() {
            return Err(SimVaultError::Config(format!(
                "store path {} is a directory",
                self.path.display()
            )));
        }
        self.guard.validate()?;
        self.retry.validate()?;
        self.health.validate()?;
        self.maintenance.validate()?;
        Ok(())
    }
}

/// Appends `suffix` to the full file name (`state.db` -> `state.db-wal`).
pub fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}
