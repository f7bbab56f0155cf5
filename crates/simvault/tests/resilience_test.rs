//! Corruption recovery, lock contention, health monitoring and circuit breaking

use simvault::prelude::*;
use simvault::CorruptionRecovery;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn agent(id: &str) -> AgentRecord {
    let mut data = AgentPayload::new();
    data.insert("goal".into(), json!("find food"));
    AgentRecord::new(AgentSummary {
        id: id.to_string(),
        name: id.to_uppercase(),
        state: "idle".to_string(),
        location_id: None,
        money: 10.0,
        energy: 50.0,
        hunger: 20.0,
        social: 30.0,
    })
    .with_data(data)
}

fn corrupt(path: &Path) {
    fs::write(path, b"garbage garbage garbage ".repeat(500)).unwrap();
}

fn quarantined(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            name.starts_with("sim.db.corrupt.") && !name.ends_with("-wal") && !name.ends_with("-shm")
        })
        .collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Small backoff so reconnect loops finish quickly.
fn fast_health() -> HealthConfig {
    HealthConfig::default()
        .with_interval_ms(20)
        .with_reconnect_backoff(1, 4)
}

#[tokio::test]
async fn test_corrupt_store_restored_from_daily_backup() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(temp_dir.path().join("sim.db"));

    {
        let vault = SimVault::open(config.clone()).unwrap();
        vault.upsert_agents(&[agent("a1"), agent("a2")]).await.unwrap();
        vault.create_checkpoint(7).await.unwrap();
        let outcome = vault.request_backup("daily").await;
        assert!(outcome.is_completed(), "{:?}", outcome);
        vault.close().unwrap();
    }
    assert!(config.daily_backup_path().exists());

    corrupt(&config.path);

    let vault = SimVault::open(config.clone()).unwrap();
    assert_eq!(quarantined(temp_dir.path()).len(), 1);
    assert_eq!(vault.list_agents().await.unwrap().len(), 2);
    assert_eq!(vault.load_latest_state().await.unwrap().tick, 7);
    assert!(vault.health().is_healthy);
}

#[tokio::test]
async fn test_corrupt_store_without_backup_starts_fresh() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(temp_dir.path().join("sim.db"));
    corrupt(&config.path);
    let original = fs::read(&config.path).unwrap();

    let vault = SimVault::open(config).unwrap();

    let moved = quarantined(temp_dir.path());
    assert_eq!(moved.len(), 1);
    assert_eq!(fs::read(&moved[0]).unwrap(), original);
    assert!(vault.list_agents().await.unwrap().is_empty());
    assert!(vault.load_latest_state().await.unwrap().is_fresh());
}

#[test]
fn test_recovery_reports_restore() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(temp_dir.path().join("sim.db"));
    corrupt(&config.path);

    let mut manager = simvault::ConnectionManager::new(config);
    let report = manager.connect().unwrap();
    assert!(matches!(
        report.recovery,
        Some(CorruptionRecovery::FreshStore { .. })
    ));
}

#[test]
fn test_open_fails_when_store_cannot_be_created() {
    let temp_dir = tempfile::tempdir().unwrap();
    let blocker = temp_dir.path().join("data");
    fs::write(&blocker, b"a file where a directory should be").unwrap();

    let result = SimVault::open(StoreConfig::new(blocker.join("sim.db")));
    assert!(matches!(result, Err(SimVaultError::Connection(_))));
}

#[tokio::test]
async fn test_busy_store_retries_then_surfaces() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(temp_dir.path().join("sim.db"))
        .with_busy_timeout_ms(10)
        .with_retry(RetryConfig::default().with_base_delay_ms(1));
    let vault = SimVault::open(config.clone()).unwrap();

    // A second writer holds the write lock
    let blocker = rusqlite::Connection::open(&config.path).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

    let result = vault
        .write_event(&SimulationEvent::new(1, "blocked", Value::Null))
        .await;
    assert!(matches!(result, Err(SimVaultError::Busy(_))));
    assert_eq!(vault.metrics_snapshot().errors_for("write_event"), 3);

    // Reads are not blocked by a writer under WAL
    assert!(vault.list_agents().await.unwrap().is_empty());

    blocker.execute_batch("COMMIT").unwrap();
    let outcome = vault
        .write_event(&SimulationEvent::new(2, "unblocked", Value::Null))
        .await
        .unwrap();
    assert!(outcome.is_written());
    // Busy is not a connection failure
    assert_eq!(vault.health().phase, HealthPhase::Healthy);
}

#[tokio::test]
async fn test_read_row_limit_surfaces() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(temp_dir.path().join("sim.db"))
        .with_guard(GuardConfig::default().with_max_rows(150));
    let vault = SimVault::open(config).unwrap();

    let agents: Vec<AgentRecord> = (0..300).map(|i| agent(&format!("a{:03}", i))).collect();
    vault.upsert_agents(&agents).await.unwrap();

    let err = vault.list_agents().await.unwrap_err();
    assert!(matches!(err, SimVaultError::RowLimitExceeded { limit: 150, .. }));
    let snapshot = vault.metrics_snapshot();
    assert_eq!(snapshot.slow_queries, 1);
    // Guard aborts are not retried
    assert_eq!(snapshot.errors_for("list_agents"), 1);
}

#[tokio::test]
async fn test_probe_failure_reconnects() {
    init_tracing();
    let temp_dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(temp_dir.path().join("sim.db")).with_health(fast_health());
    let vault = SimVault::open(config).unwrap();
    vault.upsert_agents(&[agent("a1")]).await.unwrap();
    assert_eq!(vault.connection().lock().generation(), 1);

    // Lose the handle
    vault.connection().lock().close();
    vault.check_health().await;

    let health = vault.health();
    assert_eq!(health.phase, HealthPhase::Healthy);
    assert_eq!(health.reconnect_attempts, 0);
    assert_eq!(health.health_check_counter, 1);
    assert_eq!(vault.connection().lock().generation(), 2);
    assert_eq!(vault.list_agents().await.unwrap().len(), 1);
    assert_eq!(vault.metrics_snapshot().errors_for("health_probe"), 1);
}

#[tokio::test]
async fn test_circuit_opens_after_exhausted_reconnects() {
    init_tracing();
    let temp_dir = tempfile::tempdir().unwrap();
    let data_dir = temp_dir.path().join("data");
    let config = StoreConfig::new(data_dir.join("sim.db")).with_health(fast_health());
    let vault = SimVault::open(config).unwrap();

    // Lose the handle and make the store impossible to reopen
    vault.connection().lock().close();
    fs::rename(&data_dir, temp_dir.path().join("moved")).unwrap();
    fs::write(&data_dir, b"not a directory").unwrap();

    vault.check_health().await;

    let health = vault.health();
    assert_eq!(health.phase, HealthPhase::CircuitOpen);
    assert!(health.circuit_open);
    assert!(!health.is_healthy);
    assert_eq!(health.reconnect_attempts, 5);
    // One probe failure plus five failed reconnects
    assert_eq!(vault.metrics_snapshot().errors_for("health_probe"), 6);

    // Writes become no-ops
    let outcome = vault
        .write_event(&SimulationEvent::new(1, "lost", Value::Null))
        .await
        .unwrap();
    assert_eq!(outcome, WriteOutcome::Suppressed);
    assert_eq!(
        vault.create_checkpoint(1).await.unwrap(),
        WriteOutcome::Suppressed
    );
    assert_eq!(
        vault.upsert_agents(&[agent("a1")]).await.unwrap(),
        WriteOutcome::Suppressed
    );

    // Reads still fail loudly
    assert!(matches!(
        vault.list_agents().await,
        Err(SimVaultError::Connection(_))
    ));

    // Further probes are skipped and nothing reconnects
    vault.check_health().await;
    let after = vault.health();
    assert_eq!(after.health_check_counter, health.health_check_counter);
    assert_eq!(after.phase, HealthPhase::CircuitOpen);
}

#[tokio::test]
async fn test_circuit_stays_open_after_store_returns() {
    let temp_dir = tempfile::tempdir().unwrap();
    let data_dir = temp_dir.path().join("data");
    let moved = temp_dir.path().join("moved");
    let config = StoreConfig::new(data_dir.join("sim.db")).with_health(fast_health());
    let vault = SimVault::open(config).unwrap();

    vault.connection().lock().close();
    fs::rename(&data_dir, &moved).unwrap();
    fs::write(&data_dir, b"not a directory").unwrap();
    vault.check_health().await;
    assert!(vault.health().circuit_open);

    // The store is reachable again, but nothing closes the circuit
    fs::remove_file(&data_dir).unwrap();
    fs::rename(&moved, &data_dir).unwrap();
    let monitor = vault.start_health_monitor();
    tokio::time::sleep(Duration::from_millis(100)).await;
    monitor.shutdown().await;

    let health = vault.health();
    assert!(health.circuit_open);
    assert_eq!(health.phase, HealthPhase::CircuitOpen);
    assert!(!vault.connection().lock().is_connected());
    assert_eq!(
        vault
            .write_event(&SimulationEvent::new(1, "after", Value::Null))
            .await
            .unwrap(),
        WriteOutcome::Suppressed
    );
}

#[tokio::test]
async fn test_background_monitor_recovers_and_shuts_down() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(temp_dir.path().join("sim.db")).with_health(fast_health());
    let vault = SimVault::open(config).unwrap();
    let monitor = vault.start_health_monitor();

    vault.connection().lock().close();

    let mut recovered = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if vault.connection().lock().is_connected() && vault.health().is_healthy {
            recovered = true;
            break;
        }
    }
    monitor.shutdown().await;

    assert!(recovered);
    assert!(vault.health().health_check_counter >= 1);
}
