use crate::classify;
use rusqlite::{Params, Row, Statement};
use simvault_core::{GuardConfig, MetricsRegistry, Result, SimVaultError};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Bounds a read by row count and wall-clock time.
///
/// Rows are pulled one at a time; every `check_interval_rows` rows the
/// elapsed time and row count are checked and the read is abandoned with
/// [`SimVaultError::QueryTimeout`] or [`SimVaultError::RowLimitExceeded`].
/// Abandoned reads bump the slow-query counter.
#[derive(Clone)]
pub struct QueryGuard {
    config: GuardConfig,
    metrics: Arc<MetricsRegistry>,
}

impl QueryGuard {
    pub fn new(config: GuardConfig, metrics: Arc<MetricsRegistry>) -> Self {
        Self { config, metrics }
    }

    pub fn max_rows(&self) -> usize {
        self.config.max_rows
    }

    pub fn collect<T, P, F>(
        &self,
        operation: &str,
        stmt: &mut Statement<'_>,
        params: P,
        mut map: F,
    ) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let start = Instant::now();
        let interval = self.config.check_interval_rows.max(1);
        let mut out = Vec::new();

        let mut rows = stmt.query(params).map_err(classify)?;
        while let Some(row) = rows.next().map_err(classify)? {
            out.push(map(row).map_err(classify)?);
            if out.len() % interval == 0 {
                self.check(operation, start, out.len())?;
            }
        }
        drop(rows);

        // The result may end between two periodic checks.
        self.check_rows(operation, out.len())?;
        self.metrics
            .record_operation(&format!("{}.scan", operation), start.elapsed());
        Ok(out)
    }

    fn check(&self, operation: &str, start: Instant, rows: usize) -> Result<()> {
        let elapsed = start.elapsed();
        if elapsed > self.config.timeout() {
            self.metrics.record_slow_query();
            warn!(
                operation,
                rows,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = self.config.timeout_ms,
                "Read abandoned: time budget exceeded"
            );
            return Err(SimVaultError::QueryTimeout {
                operation: operation.to_string(),
                elapsed_ms: elapsed.as_millis() as u64,
                timeout_ms: self.config.timeout_ms,
            });
        }
        self.check_rows(operation, rows)
    }

    fn check_rows(&self, operation: &str, rows: usize) -> Result<()> {
        if rows > self.config.max_rows {
            self.metrics.record_slow_query();
            warn!(
                operation,
                rows,
                limit = self.config.max_rows,
                "Read abandoned: row limit exceeded"
            );
            return Err(SimVaultError::RowLimitExceeded {
                operation: operation.to_string(),
                rows,
                limit: self.config.max_rows,
            });
        }
        Ok(())
    }
}
