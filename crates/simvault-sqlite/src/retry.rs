use simvault_core::{MetricsRegistry, Result, RetryConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Runs store operations with timing and bounded retry.
///
/// Only [`SimVaultError::Busy`](simvault_core::SimVaultError::Busy) is
/// retried. Each failed attempt is counted under the operation name; each
/// success records its latency.
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    slow_threshold: Duration,
    metrics: Arc<MetricsRegistry>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig, slow_threshold: Duration, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            config,
            slow_threshold,
            metrics,
        }
    }

    pub async fn run<T, F>(&self, operation: &str, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt: u32 = 1;
        loop {
            let start = Instant::now();
            let result = attempt_fn();
            let elapsed = start.elapsed();

            if elapsed > self.slow_threshold {
                warn!(
                    operation,
                    attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Slow store operation"
                );
            }

            match result {
                Ok(value) => {
                    self.metrics.record_operation(operation, elapsed);
                    if attempt > 1 {
                        debug!(operation, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    self.metrics.record_error(operation);
                    if !e.is_transient() || attempt >= self.config.max_attempts {
                        return Err(e);
                    }
                    let delay = self.config.delay_after(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Store busy, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
