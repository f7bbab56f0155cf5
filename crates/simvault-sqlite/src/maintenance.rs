use crate::connection::{ConnectionManager, WalCheckpoint};
use crate::ops;
use simvault_core::{MaintenanceConfig, MetricsRegistry, Result, SimVaultError, Tick};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub tick: Tick,
    pub events_deleted: usize,
    pub memories_deleted: usize,
    /// The memories table has no tick column, so it was not pruned
    pub memories_skipped: bool,
    pub wal: WalCheckpoint,
}

/// Counts checkpoints and runs pruning plus WAL truncation every
/// `prune_interval` of them.
pub struct MaintenanceScheduler {
    config: MaintenanceConfig,
    counter: u32,
    memory_aging_warned: bool,
    metrics: Arc<MetricsRegistry>,
}

impl MaintenanceScheduler {
    pub fn new(config: MaintenanceConfig, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            config,
            counter: 0,
            memory_aging_warned: false,
            metrics,
        }
    }

    /// Checkpoints counted since the last run.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Count one checkpoint at `tick`; run maintenance if the interval is reached.
    ///
    /// The counter resets before the run starts, so a failed run is not
    /// retried on the next checkpoint.
    pub fn on_checkpoint(
        &mut self,
        manager: &mut ConnectionManager,
        tick: Tick,
    ) -> Result<Option<MaintenanceReport>> {
        self.counter += 1;
        if self.counter < self.config.prune_interval {
            self.metrics.set_prune_counter(self.counter);
            return Ok(None);
        }
        self.counter = 0;
        self.metrics.set_prune_counter(0);
        self.run(manager, tick).map(Some)
    }

    /// Prune old events and memories, then truncate the write-ahead log.
    pub fn run(&mut self, manager: &mut ConnectionManager, tick: Tick) -> Result<MaintenanceReport> {
        let start = Instant::now();
        let event_cutoff = tick - self.config.event_retention_ticks;
        let memory_aging = manager.memory_aging();
        if !memory_aging && !self.memory_aging_warned {
            warn!("memories table has no tick column; memory pruning disabled");
            self.memory_aging_warned = true;
        }
        let memory_cutoff = memory_aging.then(|| tick - self.config.memory_retention_ticks);

        let (events_deleted, memories_deleted) =
            ops::prune(manager.connection_mut()?, event_cutoff, memory_cutoff)
                .map_err(|e| SimVaultError::Maintenance(format!("prune failed: {}", e)))?;

        let wal = manager
            .checkpoint_wal()
            .map_err(|e| SimVaultError::Maintenance(format!("wal checkpoint failed: {}", e)))?;
        if wal.busy {
            warn!(tick, "WAL checkpoint could not complete, readers still active");
        }

        self.metrics
            .record_maintenance_run(events_deleted as u64, memories_deleted as u64);
        self.metrics.record_operation("maintenance", start.elapsed());
        self.metrics.record_storage_sizes(manager.storage_sizes());

        info!(
            tick,
            events_deleted,
            memories_deleted,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Maintenance complete"
        );

        Ok(MaintenanceReport {
            tick,
            events_deleted,
            memories_deleted,
            memories_skipped: !memory_aging,
            wal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use simvault_core::{NewMemory, SimulationEvent, StoreConfig};

    fn connected(dir: &tempfile::TempDir) -> ConnectionManager {
        let mut manager = ConnectionManager::new(StoreConfig::new(dir.path().join("state.db")));
        manager.connect().unwrap();
        manager
    }

    fn scheduler(interval: u32) -> (MaintenanceScheduler, Arc<MetricsRegistry>) {
        let metrics = Arc::new(MetricsRegistry::new());
        let config = MaintenanceConfig::default().with_prune_interval(interval);
        (MaintenanceScheduler::new(config, metrics.clone()), metrics)
    }

    #[test]
    fn test_runs_every_interval() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = connected(&dir);
        let (mut scheduler, metrics) = scheduler(3);

        assert!(scheduler.on_checkpoint(&mut manager, 1).unwrap().is_none());
        assert!(scheduler.on_checkpoint(&mut manager, 2).unwrap().is_none());
        assert_eq!(metrics.snapshot().maintenance.prune_counter, 2);

        let report = scheduler.on_checkpoint(&mut manager, 3).unwrap();
        assert!(report.is_some());
        assert_eq!(scheduler.counter(), 0);
        assert_eq!(metrics.snapshot().maintenance.runs, 1);
        assert!(scheduler.on_checkpoint(&mut manager, 4).unwrap().is_none());
    }

    #[test]
    fn test_prunes_and_truncates_wal() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = connected(&dir);
        {
            let conn = manager.connection_mut().unwrap();
            for tick in [4000, 4999, 5000, 5999] {
                ops::insert_event(conn, &SimulationEvent::new(tick, "tick", Value::Null)).unwrap();
            }
            let memories: Vec<NewMemory> = [500, 999, 1000]
                .iter()
                .map(|&tick| NewMemory {
                    agent_id: "a".into(),
                    tick,
                    text: "seen".into(),
                    kind: "observation".into(),
                    importance: 1.0,
                })
                .collect();
            ops::insert_memories(conn, &memories).unwrap();
        }

        let (mut scheduler, metrics) = scheduler(100);
        let report = scheduler.run(&mut manager, 6000).unwrap();

        assert_eq!(report.events_deleted, 2);
        assert_eq!(report.memories_deleted, 2);
        assert!(!report.memories_skipped);
        assert_eq!(manager.storage_sizes().wal_bytes, 0);
        assert_eq!(metrics.snapshot().maintenance.events_deleted, 2);
    }

    #[test]
    fn test_run_fails_when_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = connected(&dir);
        manager.close();

        let (mut scheduler, _) = scheduler(1);
        assert!(scheduler.on_checkpoint(&mut manager, 1).is_err());
        assert_eq!(scheduler.counter(), 0);
    }
}
