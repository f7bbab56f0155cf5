pub mod agent;
pub mod record;

pub use agent::{decode_payload, encode_payload, AgentPayload, AgentRecord, AgentSummary, DecodedAgent};
pub use record::{
    CheckpointRecord, MemoryRecord, NewMemory, RecoveredState, SimulationEvent, StoredEvent,
    WriteOutcome,
};

/// Simulation time, in ticks.
pub type Tick = i64;

/// Wall-clock timestamp in the format persisted alongside rows (RFC 3339, UTC).
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
