//! Startup state recovery
//!
//! Rebuilds the last checkpointed agent state on an isolated worker with its
//! own read-only handle. Agents whose payload cannot be decoded come back
//! with their light columns only and are listed in `decode_errors`.

use crate::worker::run_isolated;
use simvault_core::{CheckpointRecord, RecoveredState, Result, SimVaultError};
use simvault_sqlite::{open_read_only, ops};
use std::path::PathBuf;
use std::time::Duration;

pub struct RecoveryLoader {
    path: PathBuf,
    busy_timeout: Duration,
}

impl RecoveryLoader {
    pub fn new(path: PathBuf, busy_timeout: Duration) -> Self {
        Self { path, busy_timeout }
    }

    /// Load agent state as of `checkpoint`; `None` means a fresh simulation.
    pub async fn load(&self, checkpoint: Option<CheckpointRecord>) -> Result<RecoveredState> {
        let checkpoint = match checkpoint {
            Some(checkpoint) => checkpoint,
            None => {
                tracing::info!("No checkpoint found, starting a fresh simulation");
                return Ok(RecoveredState::fresh());
            }
        };

        let request = (self.path.clone(), self.busy_timeout);
        let decoded = run_isolated("recovery", request, |(path, busy_timeout)| {
            let conn = open_read_only(&path, busy_timeout)?;
            ops::scan_agents(&conn)
        })
        .await
        .map_err(|e| match e {
            SimVaultError::Worker(msg) => SimVaultError::Worker(msg),
            other => SimVaultError::Worker(format!("state recovery failed: {}", other)),
        })?;

        let mut state = RecoveredState {
            tick: checkpoint.tick,
            agents: Vec::with_capacity(decoded.len()),
            decode_errors: Vec::new(),
        };
        for agent in decoded {
            if let Some(reason) = &agent.decode_error {
                tracing::warn!(
                    agent_id = %agent.record.id(),
                    error = %reason,
                    "Agent payload unreadable, recovered light columns only"
                );
                state.decode_errors.push(agent.record.id().to_string());
            }
            state.agents.push(agent.record);
        }

        tracing::info!(
            tick = state.tick,
            agents = state.agents.len(),
            partial = state.decode_errors.len(),
            "State recovered from checkpoint"
        );
        Ok(state)
    }
}
