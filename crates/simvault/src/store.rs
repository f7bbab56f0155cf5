//! The persistence facade the simulation talks to
//!
//! `SimVault` owns the single live connection and routes every operation
//! through the retry executor (and, for reads, the query guard). Writes are
//! suppressed while the circuit is open; reads still try and fail normally.

use crate::backup::{BackupCoordinator, BackupOutcome};
use crate::health::{HealthMonitor, HealthMonitorHandle, HealthState};
use crate::recovery::RecoveryLoader;
use parking_lot::Mutex;
use simvault_core::{
    AgentRecord, AgentSummary, MemoryRecord, MetricsRegistry, MetricsSnapshot, NewMemory,
    RecoveredState, Result, SimVaultError, SimulationEvent, StoreConfig, StoredEvent, Tick,
    WriteOutcome,
};
use simvault_sqlite::{
    ops, ConnectionManager, CorruptionRecovery, MaintenanceScheduler, QueryGuard, RetryExecutor,
};
use std::sync::Arc;
use std::time::Duration;

pub struct SimVault {
    config: StoreConfig,
    conn: Arc<Mutex<ConnectionManager>>,
    health: Arc<HealthMonitor>,
    metrics: Arc<MetricsRegistry>,
    guard: QueryGuard,
    retry: RetryExecutor,
    maintenance: Mutex<MaintenanceScheduler>,
    backups: BackupCoordinator,
    recovery: RecoveryLoader,
}

impl SimVault {
    /// Open (or create) the store.
    ///
    /// A corrupt store is quarantined and restored here. Failing to open the
    /// store after that is fatal and returned as
    /// [`SimVaultError::Connection`].
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(MetricsRegistry::new());

        let mut manager = ConnectionManager::new(config.clone());
        let report = manager.connect().map_err(|e| {
            tracing::error!(path = %config.path.display(), error = %e, "Failed to open store");
            e
        })?;
        match &report.recovery {
            Some(CorruptionRecovery::RestoredFromBackup { quarantined, backup }) => {
                tracing::warn!(
                    quarantined = %quarantined.display(),
                    backup = %backup.display(),
                    "Opened store restored from backup"
                );
            }
            Some(CorruptionRecovery::FreshStore { quarantined }) => {
                tracing::warn!(
                    quarantined = %quarantined.display(),
                    "Opened fresh store after corruption"
                );
            }
            None => {}
        }
        metrics.record_storage_sizes(manager.storage_sizes());

        let conn = Arc::new(Mutex::new(manager));
        let health = Arc::new(HealthMonitor::new(
            config.health.clone(),
            conn.clone(),
            metrics.clone(),
        ));
        health.mark_connected();

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        Ok(Self {
            guard: QueryGuard::new(config.guard.clone(), metrics.clone()),
            retry: RetryExecutor::new(config.retry.clone(), config.guard.timeout(), metrics.clone()),
            maintenance: Mutex::new(MaintenanceScheduler::new(
                config.maintenance.clone(),
                metrics.clone(),
            )),
            backups: BackupCoordinator::new(config.clone(), metrics.clone()),
            recovery: RecoveryLoader::new(config.path.clone(), busy_timeout),
            config,
            conn,
            health,
            metrics,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ---- Writes ----

    pub async fn write_event(&self, event: &SimulationEvent) -> Result<WriteOutcome> {
        self.write("write_event", |manager| {
            ops::insert_event(manager.connection()?, event)
        })
        .await
    }

    /// Upsert a batch of agents atomically.
    pub async fn upsert_agents(&self, agents: &[AgentRecord]) -> Result<WriteOutcome> {
        if agents.is_empty() {
            return Ok(WriteOutcome::Written);
        }
        self.write("upsert_agents", |manager| {
            ops::upsert_agents(manager.connection_mut()?, agents)
        })
        .await
    }

    pub async fn write_memory(&self, memory: &NewMemory) -> Result<WriteOutcome> {
        self.write("write_memory", |manager| {
            ops::insert_memory(manager.connection()?, memory)
        })
        .await
    }

    pub async fn write_memories(&self, memories: &[NewMemory]) -> Result<WriteOutcome> {
        if memories.is_empty() {
            return Ok(WriteOutcome::Written);
        }
        self.write("write_memories", |manager| {
            ops::insert_memories(manager.connection_mut()?, memories)
        })
        .await
    }

    /// Persist a checkpoint for `tick`, then let maintenance count it.
    ///
    /// Maintenance failures are logged and counted; they never fail the
    /// checkpoint itself.
    pub async fn create_checkpoint(&self, tick: Tick) -> Result<WriteOutcome> {
        let outcome = self
            .write("create_checkpoint", |manager| {
                ops::upsert_checkpoint(manager.connection()?, tick)
            })
            .await?;
        if !outcome.is_written() {
            return Ok(outcome);
        }

        let result = {
            let mut manager = self.conn.lock();
            let mut maintenance = self.maintenance.lock();
            maintenance.on_checkpoint(&mut manager, tick)
        };
        match result {
            Ok(Some(report)) => {
                tracing::debug!(
                    tick,
                    events_deleted = report.events_deleted,
                    memories_deleted = report.memories_deleted,
                    "Checkpoint triggered maintenance"
                );
            }
            Ok(None) => {}
            Err(e) => {
                self.metrics.record_error("maintenance");
                tracing::error!(tick, error = %e, "Maintenance failed");
            }
        }
        Ok(outcome)
    }

    // ---- Reads ----

    /// Light projection of every agent, ordered by id.
    pub async fn list_agents(&self) -> Result<Vec<AgentSummary>> {
        self.read("list_agents", |manager| {
            ops::list_agents(manager.connection()?, &self.guard)
        })
        .await
    }

    /// One agent with its decoded payload.
    ///
    /// Returns `Ok(None)` for an unknown id, and also for a stored payload
    /// that cannot be decoded.
    pub async fn get_agent_data(&self, id: &str) -> Result<Option<AgentRecord>> {
        let row = self
            .read("get_agent_data", |manager| {
                ops::agent_full(manager.connection()?, id)
            })
            .await?;
        let Some((summary, raw)) = row else {
            return Ok(None);
        };

        let decoded = AgentRecord::hydrate(summary, raw.as_deref());
        if let Some(reason) = decoded.decode_error {
            tracing::warn!(agent_id = id, error = %reason, "Agent payload unreadable");
            return Ok(None);
        }
        Ok(Some(decoded.record))
    }

    /// Newest memories of one agent, at most `limit` (itself capped by the
    /// guard's row ceiling).
    pub async fn recent_memories(&self, agent_id: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        let limit = limit.min(self.guard.max_rows());
        self.read("recent_memories", |manager| {
            if !manager.memory_aging() {
                return Err(SimVaultError::Query(
                    "memories table has no tick column".into(),
                ));
            }
            ops::recent_memories(manager.connection()?, &self.guard, agent_id, limit)
        })
        .await
    }

    pub async fn recent_events(&self, limit: usize) -> Result<Vec<StoredEvent>> {
        let limit = limit.min(self.guard.max_rows());
        self.read("recent_events", |manager| {
            ops::recent_events(manager.connection()?, &self.guard, limit)
        })
        .await
    }

    // ---- Backup / recovery ----

    /// Back up the store under `label`. Never fails; inspect the outcome.
    pub async fn request_backup(&self, label: &str) -> BackupOutcome {
        self.backups.backup(label).await
    }

    /// Latest checkpoint tick and the agent state stored with it.
    ///
    /// An empty store yields a fresh state. A recovery worker failure is
    /// fatal and returned as [`SimVaultError::Worker`].
    pub async fn load_latest_state(&self) -> Result<RecoveredState> {
        let checkpoint = self
            .read("latest_checkpoint", |manager| {
                ops::latest_checkpoint(manager.connection()?)
            })
            .await?;
        self.recovery.load(checkpoint).await
    }

    // ---- Health / metrics ----

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let sizes = self.conn.lock().storage_sizes();
        self.metrics.record_storage_sizes(sizes);
        self.metrics.snapshot()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn health(&self) -> HealthState {
        self.health.state()
    }

    pub fn health_monitor(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Run one probe cycle now.
    pub async fn check_health(&self) {
        self.health.check_once().await
    }

    /// Probe every `health.interval_ms` in the background.
    pub fn start_health_monitor(&self) -> HealthMonitorHandle {
        self.health.clone().spawn()
    }

    /// Shared handle to the connection manager (custom queries and tests).
    pub fn connection(&self) -> &Arc<Mutex<ConnectionManager>> {
        &self.conn
    }

    /// Truncate the WAL and drop the live handle.
    pub fn close(&self) -> Result<()> {
        let mut manager = self.conn.lock();
        if manager.is_connected() {
            manager.checkpoint_wal()?;
        }
        manager.close();
        tracing::info!(path = %self.config.path.display(), "Store closed");
        Ok(())
    }

    async fn write<T, F>(&self, operation: &str, mut f: F) -> Result<WriteOutcome>
    where
        F: FnMut(&mut ConnectionManager) -> Result<T>,
    {
        if self.health.writes_suppressed() {
            tracing::debug!(operation, "Circuit open, write suppressed");
            return Ok(WriteOutcome::Suppressed);
        }
        self.retry
            .run(operation, || f(&mut *self.conn.lock()))
            .await
            .map(|_| WriteOutcome::Written)
            .map_err(|e| self.note_failure(operation, e))
    }

    async fn read<T, F>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut(&ConnectionManager) -> Result<T>,
    {
        self.retry
            .run(operation, || f(&*self.conn.lock()))
            .await
            .map_err(|e| self.note_failure(operation, e))
    }

    fn note_failure(&self, operation: &str, e: SimVaultError) -> SimVaultError {
        if matches!(
            e,
            SimVaultError::Connection(_) | SimVaultError::Corruption(_)
        ) {
            self.health.mark_degraded();
        }
        tracing::warn!(operation, error = %e, "Store operation failed");
        e
    }
}
