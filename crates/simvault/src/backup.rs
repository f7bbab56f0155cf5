//! Online backups on an isolated worker
//!
//! A backup copies the live store through SQLite's online backup API into
//! `<backup_dir>/backup_<label>.db.tmp` and renames it into place, so a
//! reader never sees a half-written backup. Backups never fail the caller:
//! the outcome is reported, logged and counted.

use crate::worker::run_isolated;
use rusqlite::DatabaseName;
use serde::Serialize;
use simvault_core::config::sidecar;
use simvault_core::{MetricsRegistry, Result, SimVaultError, StoreConfig};
use simvault_sqlite::open_read_only;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything the worker needs; nothing shared with the live connection.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub label: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub busy_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupReport {
    pub label: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Completed(BackupReport),
    Failed { label: String, error: String },
}

impl BackupOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, BackupOutcome::Completed(_))
    }
}

pub struct BackupCoordinator {
    config: StoreConfig,
    metrics: Arc<MetricsRegistry>,
}

impl BackupCoordinator {
    pub fn new(config: StoreConfig, metrics: Arc<MetricsRegistry>) -> Self {
        Self { config, metrics }
    }

    /// Copy the store to `backup_<label>.db`. The `daily` label produces the
    /// file consulted by corruption recovery.
    pub async fn backup(&self, label: &str) -> BackupOutcome {
        let start = Instant::now();
        let result = match validate_label(label) {
            Ok(()) => {
                let request = BackupRequest {
                    label: label.to_string(),
                    source: self.config.path.clone(),
                    destination: self.config.backup_path(label),
                    busy_timeout: Duration::from_millis(self.config.busy_timeout_ms),
                };
                run_isolated("backup", request, copy_database).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(report) => {
                self.metrics.record_operation("backup", start.elapsed());
                tracing::info!(
                    label = %report.label,
                    path = %report.path.display(),
                    bytes = report.bytes,
                    duration_ms = report.duration_ms,
                    "Backup complete"
                );
                BackupOutcome::Completed(report)
            }
            Err(e) => {
                self.metrics.record_error("backup");
                tracing::error!(label, error = %e, "Backup failed");
                BackupOutcome::Failed {
                    label: label.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }
}

fn validate_label(label: &str) -> Result<()> {
    if label.is_empty()
        || !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SimVaultError::Config(format!(
            "invalid backup label '{}': use letters, digits, '-' or '_'",
            label
        )));
    }
    Ok(())
}

/// Worker body: online backup into a temp file, then rename.
fn copy_database(request: BackupRequest) -> Result<BackupReport> {
    let start = Instant::now();
    if let Some(parent) = request.destination.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = sidecar(&request.destination, ".tmp");
    if tmp.exists() {
        fs::remove_file(&tmp)?;
    }

    let source = open_read_only(&request.source, request.busy_timeout)?;
    source
        .backup(DatabaseName::Main, &tmp, None)
        .map_err(|e| SimVaultError::Query(format!("online backup failed: {}", e)))?;
    drop(source);

    fs::rename(&tmp, &request.destination)?;
    let bytes = fs::metadata(&request.destination)?.len();

    Ok(BackupReport {
        label: request.label,
        path: request.destination,
        bytes,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_validation() {
        assert!(validate_label("daily").is_ok());
        assert!(validate_label("tick-6000_b").is_ok());
        assert!(validate_label("").is_err());
        assert!(validate_label("../escape").is_err());
        assert!(validate_label("with space").is_err());
    }

    #[tokio::test]
    async fn test_missing_source_fails_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("absent.db"));
        let metrics = Arc::new(MetricsRegistry::new());
        let coordinator = BackupCoordinator::new(config, metrics.clone());

        let outcome = coordinator.backup("daily").await;
        assert!(!outcome.is_completed());
        assert_eq!(metrics.snapshot().errors_for("backup"), 1);
    }
}
