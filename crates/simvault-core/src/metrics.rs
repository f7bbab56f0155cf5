//! Process-lifetime operation metrics
//!
//! Accumulates per-operation latency, error counts, slow-query aborts,
//! maintenance totals and the last storage size sample. Nothing here is ever
//! reset; snapshots are cheap copies.

use crate::observe;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Latency accumulator for one named operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationMetric {
    pub name: String,
    pub count: u64,
    pub total_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

impl OperationMetric {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            count: 0,
            total_ms: 0.0,
            avg_ms: 0.0,
            max_ms: 0.0,
        }
    }

    fn record(&mut self, elapsed_ms: f64) {
        self.count += 1;
        self.total_ms += elapsed_ms;
        self.avg_ms = self.total_ms / self.count as f64;
        if elapsed_ms > self.max_ms {
            self.max_ms = elapsed_ms;
        }
    }
}

/// Store and write-ahead-log file sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageSizes {
    pub db_bytes: u64,
    pub wal_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceCounters {
    /// Checkpoints since the last maintenance run
    pub prune_counter: u32,
    pub runs: u64,
    pub events_deleted: u64,
    pub memories_deleted: u64,
}

/// Point-in-time copy of the registry
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub operations: Vec<OperationMetric>,
    pub errors: BTreeMap<String, u64>,
    pub total_errors: u64,
    pub slow_queries: u64,
    pub maintenance: MaintenanceCounters,
    pub storage: Option<StorageSizes>,
}

impl MetricsSnapshot {
    pub fn operation(&self, name: &str) -> Option<&OperationMetric> {
        self.operations.iter().find(|op| op.name == name)
    }

    pub fn errors_for(&self, name: &str) -> u64 {
        self.errors.get(name).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    operations: Mutex<HashMap<String, OperationMetric>>,
    errors: Mutex<HashMap<String, u64>>,
    total_errors: AtomicU64,
    slow_queries: AtomicU64,
    maintenance: Mutex<MaintenanceCounters>,
    storage: Mutex<Option<StorageSizes>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_operation(&self, name: &str, elapsed: Duration) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let mut operations = self.operations.lock();
        operations
            .entry(name.to_string())
            .or_insert_with(|| OperationMetric::new(name))
            .record(elapsed_ms);
        drop(operations);
        observe::record_operation(name, elapsed);
    }

    pub fn record_error(&self, name: &str) {
        *self.errors.lock().entry(name.to_string()).or_insert(0) += 1;
        self.total_errors.fetch_add(1, Ordering::Relaxed);
        observe::record_error(name);
    }

    pub fn record_slow_query(&self) {
        self.slow_queries.fetch_add(1, Ordering::Relaxed);
        observe::record_slow_query();
    }

    pub fn set_prune_counter(&self, counter: u32) {
        self.maintenance.lock().prune_counter = counter;
    }

    pub fn record_maintenance_run(&self, events_deleted: u64, memories_deleted: u64) {
        let mut maintenance = self.maintenance.lock();
        maintenance.runs += 1;
        maintenance.events_deleted += events_deleted;
        maintenance.memories_deleted += memories_deleted;
        drop(maintenance);
        observe::record_pruned(events_deleted, memories_deleted);
    }

    pub fn record_storage_sizes(&self, sizes: StorageSizes) {
        *self.storage.lock() = Some(sizes);
        observe::set_storage_sizes(sizes.db_bytes, sizes.wal_bytes);
    }

    pub fn slow_queries(&self) -> u64 {
        self.slow_queries.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut operations: Vec<OperationMetric> =
            self.operations.lock().values().cloned().collect();
        operations.sort_by(|a, b| a.name.cmp(&b.name));
        let errors = self
            .errors
            .lock()
            .iter()
            .map(|(name, count)| (name.clone(), *count))
            .collect();

        MetricsSnapshot {
            operations,
            errors,
            total_errors: self.total_errors(),
            slow_queries: self.slow_queries(),
            maintenance: *self.maintenance.lock(),
            storage: *self.storage.lock(),
        }
    }
}
