//! Health monitoring and circuit breaking
//!
//! A periodic probe runs `SELECT 1` against the live handle. A failed probe
//! marks the store degraded and starts reconnecting with exponential backoff
//! (2s, 4s, 8s, 16s, then capped at 30s). Once the reconnect budget is spent
//! the circuit opens: writes are suppressed and probes stop. There is no
//! automatic way back; the circuit stays open for the life of the process.
//!
//! # Example
//!
//! ```no_run
//! use simvault::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let vault = SimVault::open(StoreConfig::new("./data/sim.db"))?;
//! let monitor = vault.start_health_monitor();
//!
//! // ... run the simulation ...
//!
//! monitor.shutdown().await;
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use simvault_core::{HealthConfig, MetricsRegistry};
use simvault_sqlite::ConnectionManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Coarse store health, as seen by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthPhase {
    Healthy,
    /// The last probe or operation failed; recovery has not started yet
    Degraded,
    Reconnecting,
    /// Reconnect budget exhausted, writes suppressed
    CircuitOpen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthState {
    pub phase: HealthPhase,
    pub is_healthy: bool,
    /// Reconnect attempts made since the last successful connect
    pub reconnect_attempts: u32,
    pub circuit_open: bool,
    /// Probes run so far
    pub health_check_counter: u64,
}

impl HealthState {
    fn new() -> Self {
        Self {
            phase: HealthPhase::Degraded,
            is_healthy: false,
            reconnect_attempts: 0,
            circuit_open: false,
            health_check_counter: 0,
        }
    }
}

/// What the monitor does after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureAction {
    Reconnect { attempt: u32, delay: Duration },
    OpenCircuit,
    CircuitAlreadyOpen,
}

pub struct HealthMonitor {
    config: HealthConfig,
    state: Mutex<HealthState>,
    conn: Arc<Mutex<ConnectionManager>>,
    metrics: Arc<MetricsRegistry>,
}

impl HealthMonitor {
    pub fn new(
        config: HealthConfig,
        conn: Arc<Mutex<ConnectionManager>>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            config,
            state: Mutex::new(HealthState::new()),
            conn,
            metrics,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state.lock().clone()
    }

    /// Writes are suppressed while the circuit is open.
    pub fn writes_suppressed(&self) -> bool {
        self.state.lock().circuit_open
    }

    /// A connect or reconnect succeeded. Only the monitor's own recovery
    /// path reconnects, and it stops once the circuit opens.
    pub(crate) fn mark_connected(&self) {
        let mut state = self.state.lock();
        state.is_healthy = true;
        state.reconnect_attempts = 0;
        state.circuit_open = false;
        state.phase = HealthPhase::Healthy;
    }

    pub(crate) fn mark_degraded(&self) {
        let mut state = self.state.lock();
        state.is_healthy = false;
        if !state.circuit_open && state.phase == HealthPhase::Healthy {
            state.phase = HealthPhase::Degraded;
        }
    }

    /// Record a successful probe. Returns true if the store was unhealthy before.
    pub(crate) fn record_probe_success(&self) -> bool {
        let mut state = self.state.lock();
        let was_unhealthy = !state.is_healthy;
        state.is_healthy = true;
        if !state.circuit_open {
            state.phase = HealthPhase::Healthy;
            state.reconnect_attempts = 0;
        }
        was_unhealthy
    }

    /// Account for one failure and decide what to do about it.
    ///
    /// Probe failures and failed reconnects both land here. The circuit opens
    /// on the first failure after `max_reconnect_attempts` attempts were used.
    pub(crate) fn record_failure(&self) -> FailureAction {
        self.metrics.record_error("health_probe");
        let mut state = self.state.lock();
        state.is_healthy = false;

        if state.circuit_open {
            return FailureAction::CircuitAlreadyOpen;
        }
        if state.reconnect_attempts >= self.config.max_reconnect_attempts {
            state.circuit_open = true;
            state.phase = HealthPhase::CircuitOpen;
            return FailureAction::OpenCircuit;
        }

        state.reconnect_attempts += 1;
        state.phase = HealthPhase::Reconnecting;
        let attempt = state.reconnect_attempts;
        FailureAction::Reconnect {
            attempt,
            delay: self.config.reconnect_delay(attempt),
        }
    }

    /// Probes are skipped once the circuit is open and the budget is spent.
    pub fn should_skip_probe(&self) -> bool {
        let state = self.state.lock();
        state.circuit_open && state.reconnect_attempts >= self.config.max_reconnect_attempts
    }

    /// Run one probe cycle: sample memory, probe, and recover on failure.
    pub async fn check_once(&self) {
        if self.should_skip_probe() {
            tracing::debug!("Circuit open, skipping health probe");
            return;
        }

        let count = {
            let mut state = self.state.lock();
            state.health_check_counter += 1;
            state.health_check_counter
        };

        if let Some(rss) = resident_memory_bytes() {
            if rss > self.config.memory_high_water_bytes {
                tracing::warn!(
                    rss_bytes = rss,
                    high_water_bytes = self.config.memory_high_water_bytes,
                    "Resident memory above high-water mark"
                );
            }
        }

        if count % self.config.snapshot_every == 0 {
            self.log_snapshot(count);
        }

        let probe = self.conn.lock().probe();
        match probe {
            Ok(()) => {
                if self.record_probe_success() {
                    tracing::info!("Store health restored");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Health probe failed");
                self.mark_degraded();
                self.recover().await;
            }
        }
    }

    async fn recover(&self) {
        loop {
            match self.record_failure() {
                FailureAction::Reconnect { attempt, delay } => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.config.max_reconnect_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting to store"
                    );
                    tokio::time::sleep(delay).await;

                    let result = self.conn.lock().reconnect();
                    match result {
                        Ok(report) => {
                            self.mark_connected();
                            tracing::info!(
                                attempt,
                                generation = report.generation,
                                "Store reconnected"
                            );
                            return;
                        }
                        Err(e) => {
                            tracing::warn!(attempt, error = %e, "Reconnect failed");
                        }
                    }
                }
                FailureAction::OpenCircuit => {
                    tracing::error!(
                        attempts = self.config.max_reconnect_attempts,
                        "Reconnect attempts exhausted, circuit open; writes suppressed"
                    );
                    return;
                }
                FailureAction::CircuitAlreadyOpen => return,
            }
        }
    }

    fn log_snapshot(&self, count: u64) {
        let snapshot = self.metrics.snapshot();
        let sizes = self.conn.lock().storage_sizes();
        self.metrics.record_storage_sizes(sizes);
        tracing::info!(
            probe = count,
            total_errors = snapshot.total_errors,
            slow_queries = snapshot.slow_queries,
            maintenance_runs = snapshot.maintenance.runs,
            events_deleted = snapshot.maintenance.events_deleted,
            memories_deleted = snapshot.maintenance.memories_deleted,
            db_bytes = sizes.db_bytes,
            wal_bytes = sizes.wal_bytes,
            "Store metrics"
        );
        for op in &snapshot.operations {
            tracing::info!(
                operation = %op.name,
                count = op.count,
                avg_ms = op.avg_ms,
                max_ms = op.max_ms,
                "Operation latency"
            );
        }
    }

    /// Start probing every `interval_ms` on the current runtime.
    pub fn spawn(self: Arc<Self>) -> HealthMonitorHandle {
        let shutdown = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let period = self.config.interval();

        let task = {
            let shutdown = shutdown.clone();
            let wake = wake.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick fires immediately.
                ticker.tick().await;

                tracing::info!(interval_ms = period.as_millis() as u64, "Health monitor started");
                while !shutdown.load(Ordering::Relaxed) {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = wake.notified() => {}
                    }
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    self.check_once().await;
                }
                tracing::info!("Health monitor stopped");
            })
        };

        HealthMonitorHandle {
            shutdown,
            wake,
            task,
        }
    }
}

/// Handle to a running health monitor task
pub struct HealthMonitorHandle {
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

impl HealthMonitorHandle {
    pub async fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.wake.notify_one();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Health monitor task ended abnormally");
        }
    }
}

#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use simvault_core::StoreConfig;

    fn monitor(max_attempts: u32) -> HealthMonitor {
        let dir = std::env::temp_dir().join("simvault-health-unit.db");
        let manager = ConnectionManager::new(StoreConfig::new(dir));
        let config = HealthConfig {
            max_reconnect_attempts: max_attempts,
            ..HealthConfig::default()
        };
        HealthMonitor::new(
            config,
            Arc::new(Mutex::new(manager)),
            Arc::new(MetricsRegistry::new()),
        )
    }

    #[test]
    fn test_failure_sequence_opens_circuit() {
        let monitor = monitor(5);
        monitor.mark_connected();

        let mut delays = Vec::new();
        for _ in 0..5 {
            match monitor.record_failure() {
                FailureAction::Reconnect { delay, .. } => delays.push(delay.as_millis()),
                other => panic!("unexpected action: {:?}", other),
            }
        }
        assert_eq!(delays, vec![2000, 4000, 8000, 16000, 30000]);
        assert!(!monitor.writes_suppressed());

        assert_eq!(monitor.record_failure(), FailureAction::OpenCircuit);
        assert!(monitor.writes_suppressed());
        assert!(monitor.should_skip_probe());
        assert_eq!(monitor.state().phase, HealthPhase::CircuitOpen);

        assert_eq!(monitor.record_failure(), FailureAction::CircuitAlreadyOpen);
    }

    #[test]
    fn test_successful_reconnect_resets_attempts() {
        let monitor = monitor(5);
        monitor.record_failure();
        monitor.record_failure();
        assert_eq!(monitor.state().reconnect_attempts, 2);

        monitor.mark_connected();
        let state = monitor.state();
        assert_eq!(state.reconnect_attempts, 0);
        assert_eq!(state.phase, HealthPhase::Healthy);
        assert!(state.is_healthy);
    }

    #[test]
    fn test_probe_success_after_degraded() {
        let monitor = monitor(5);
        monitor.mark_connected();
        monitor.mark_degraded();
        assert_eq!(monitor.state().phase, HealthPhase::Degraded);
        assert!(monitor.record_probe_success());
        assert!(!monitor.record_probe_success());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_snapshot_logs_latencies_and_pruning() {
        let metrics = Arc::new(MetricsRegistry::new());
        metrics.record_operation("list_agents", Duration::from_millis(12));
        metrics.record_maintenance_run(4, 2);
        let path = std::env::temp_dir().join("simvault-health-snapshot.db");
        let monitor = HealthMonitor::new(
            HealthConfig::default(),
            Arc::new(Mutex::new(ConnectionManager::new(StoreConfig::new(path)))),
            metrics,
        );

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || monitor.log_snapshot(10));

        let output = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert!(output.contains("events_deleted=4"), "{}", output);
        assert!(output.contains("memories_deleted=2"), "{}", output);
        assert!(output.contains("operation=list_agents"), "{}", output);
        assert!(output.contains("avg_ms="), "{}", output);
        assert!(output.contains("max_ms="), "{}", output);
    }

    #[test]
    fn test_probe_success_resets_attempts() {
        let monitor = monitor(5);
        monitor.mark_connected();
        monitor.record_failure();
        monitor.record_failure();
        monitor.mark_degraded();
        assert_eq!(monitor.state().reconnect_attempts, 2);

        assert!(monitor.record_probe_success());
        let state = monitor.state();
        assert_eq!(state.phase, HealthPhase::Healthy);
        assert_eq!(state.reconnect_attempts, 0);
        assert!(state.is_healthy);
    }

    #[test]
    fn test_probe_success_keeps_circuit_open() {
        let monitor = monitor(2);
        for _ in 0..3 {
            monitor.record_failure();
        }
        assert!(monitor.writes_suppressed());

        monitor.record_probe_success();
        let state = monitor.state();
        assert!(state.circuit_open);
        assert_eq!(state.phase, HealthPhase::CircuitOpen);
        assert_eq!(state.reconnect_attempts, 2);
        assert!(monitor.should_skip_probe());
    }
}
