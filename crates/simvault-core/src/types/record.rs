use super::agent::AgentRecord;
use super::Tick;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event to append to the simulation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationEvent {
    pub tick: Tick,
    pub kind: String,
    pub data: Value,
}

impl SimulationEvent {
    pub fn new(tick: Tick, kind: impl Into<String>, data: Value) -> Self {
        Self {
            tick,
            kind: kind.into(),
            data,
        }
    }
}

/// Event row as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: i64,
    pub tick: Tick,
    pub kind: String,
    pub data: Value,
    pub timestamp: String,
}

/// Memory to write for an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMemory {
    pub agent_id: String,
    pub tick: Tick,
    pub text: String,
    pub kind: String,
    pub importance: f64,
}

/// Memory row as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub memory_id: i64,
    pub agent_id: String,
    pub tick: Tick,
    pub text: String,
    pub kind: String,
    pub importance: f64,
    pub created_at: String,
}

/// One row per checkpointed tick, latest wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub tick: Tick,
    pub timestamp: String,
}

/// Best-effort state rebuilt at startup
#[derive(Debug, Clone, Default)]
pub struct RecoveredState {
    /// Latest checkpointed tick, 0 for a fresh simulation
    pub tick: Tick,
    pub agents: Vec<AgentRecord>,
    /// Ids of agents whose payload could not be decoded (recovered partially)
    pub decode_errors: Vec<String>,
}

impl RecoveredState {
    pub fn fresh() -> Self {
        Self::default()
    }

    pub fn is_fresh(&self) -> bool {
        self.tick == 0 && self.agents.is_empty()
    }
}

/// Whether a write reached the store.
///
/// Writes are suppressed, not failed, while the circuit breaker is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Suppressed,
}

impl WriteOutcome {
    pub fn is_written(self) -> bool {
        matches!(self, WriteOutcome::Written)
    }
}
