//! Optional metrics instrumentation for simvault.
//!
//! When the `observe` feature is enabled, every recording made through
//! [`MetricsRegistry`](crate::MetricsRegistry) is also forwarded to the
//! [`metrics`] facade. A downstream application must install a recorder
//! (e.g. `metrics-exporter-prometheus`) to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record an operation latency.
///
/// - `simvault.operation.duration_seconds` – histogram with `operation` label
#[inline]
pub fn record_operation(operation: &str, duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::histogram!("simvault.operation.duration_seconds", "operation" => operation.to_string())
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (operation, duration);
    }
}

/// Record a failed attempt.
///
/// - `simvault.operation.errors_total` – counter with `operation` label
#[inline]
pub fn record_error(operation: &str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("simvault.operation.errors_total", "operation" => operation.to_string())
            .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = operation;
    }
}

/// Record a read abandoned by the query guard.
///
/// - `simvault.query.slow_total` – counter
#[inline]
pub fn record_slow_query() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("simvault.query.slow_total").increment(1);
    }
}

/// Record rows removed by a maintenance run.
///
/// - `simvault.maintenance.rows_deleted_total` – counter with `table` label
#[inline]
pub fn record_pruned(events: u64, memories: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("simvault.maintenance.rows_deleted_total", "table" => "simulation_events")
            .increment(events);
        metrics::counter!("simvault.maintenance.rows_deleted_total", "table" => "memories")
            .increment(memories);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (events, memories);
    }
}

/// Set the storage size gauges.
///
/// - `simvault.storage.db_bytes` / `simvault.storage.wal_bytes` – gauges
#[inline]
pub fn set_storage_sizes(db_bytes: u64, wal_bytes: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!("simvault.storage.db_bytes").set(db_bytes as f64);
        metrics::gauge!("simvault.storage.wal_bytes").set(wal_bytes as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (db_bytes, wal_bytes);
    }
}
