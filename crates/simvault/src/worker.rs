//! Isolated workers for heavy I/O
//!
//! Backups and startup recovery run on a dedicated OS thread with their own
//! read-only SQLite handle, so a slow copy or a long scan never blocks the
//! simulation's connection or the async runtime. The worker reports exactly
//! once over a oneshot channel and is joined after the report arrives.

use simvault_core::{Result, SimVaultError};
use std::any::Any;
use std::thread;
use tokio::sync::oneshot;

pub(crate) async fn run_isolated<Req, Resp, F>(name: &str, request: Req, job: F) -> Result<Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    F: FnOnce(Req) -> Result<Resp> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let handle = thread::Builder::new()
        .name(format!("simvault-{}", name))
        .spawn(move || {
            let result = job(request);
            // The receiver may have been dropped if the caller was cancelled.
            let _ = tx.send(result);
        })
        .map_err(|e| SimVaultError::Worker(format!("failed to spawn {} worker: {}", name, e)))?;

    let received = rx.await;

    let joined = tokio::task::spawn_blocking(move || handle.join())
        .await
        .map_err(|e| SimVaultError::Worker(format!("{} worker join failed: {}", name, e)))?;

    match (received, joined) {
        (Ok(result), _) => result,
        (Err(_), Err(panic)) => Err(SimVaultError::Worker(format!(
            "{} worker panicked: {}",
            name,
            panic_message(panic.as_ref())
        ))),
        (Err(_), Ok(())) => Err(SimVaultError::Worker(format!(
            "{} worker exited without a result",
            name
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_result_passed_back() {
        let value = run_isolated("double", 21, |n: i32| Ok(n * 2)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_job_error_passed_back() {
        let result: Result<()> = run_isolated("fail", (), |_| {
            Err(SimVaultError::NotFound("nothing here".into()))
        })
        .await;
        assert!(matches!(result, Err(SimVaultError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_panic_becomes_worker_error() {
        let result: Result<()> = run_isolated("boom", (), |_| panic!("kaboom")).await;
        match result {
            Err(SimVaultError::Worker(msg)) => assert!(msg.contains("kaboom")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
