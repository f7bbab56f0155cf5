//! The fixed set of statements the store runs.
//!
//! Statements are prepared through the connection's statement cache, so they
//! live and die with the handle: a reconnect drops the old cache together with
//! the old connection and [`warm`] rebuilds the whole set on the new one before
//! it is published.

use crate::classify;
use rusqlite::{CachedStatement, Connection};
use simvault_core::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreparedOp {
    Probe,
    InsertEvent,
    RecentEvents,
    UpsertAgent,
    ListAgents,
    AgentFull,
    ScanAgents,
    InsertMemory,
    RecentMemories,
    UpsertCheckpoint,
    LatestCheckpoint,
    PruneEvents,
    PruneMemories,
}

impl PreparedOp {
    pub const ALL: [PreparedOp; 13] = [
        PreparedOp::Probe,
        PreparedOp::InsertEvent,
        PreparedOp::RecentEvents,
        PreparedOp::UpsertAgent,
        PreparedOp::ListAgents,
        PreparedOp::AgentFull,
        PreparedOp::ScanAgents,
        PreparedOp::InsertMemory,
        PreparedOp::RecentMemories,
        PreparedOp::UpsertCheckpoint,
        PreparedOp::LatestCheckpoint,
        PreparedOp::PruneEvents,
        PreparedOp::PruneMemories,
    ];

    pub fn sql(self) -> &'static str {
        match self {
            PreparedOp::Probe => "SELECT 1",
            PreparedOp::InsertEvent => {
                "INSERT INTO simulation_events (tick, type, data, timestamp)
                 VALUES (?1, ?2, ?3, ?4)"
            }
            PreparedOp::RecentEvents => {
                "SELECT id, tick, type, data, timestamp
                 FROM simulation_events
                 ORDER BY id DESC
                 LIMIT ?1"
            }
            PreparedOp::UpsertAgent => {
                "INSERT INTO agents (id, name, state, location_id, money, energy, hunger, social, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    state = excluded.state,
                    location_id = excluded.location_id,
                    money = excluded.money,
                    energy = excluded.energy,
                    hunger = excluded.hunger,
                    social = excluded.social,
                    data = excluded.data"
            }
            PreparedOp::ListAgents => {
                "SELECT id, name, state, location_id, money, energy, hunger, social
                 FROM agents
                 ORDER BY id"
            }
            PreparedOp::AgentFull => {
                "SELECT id, name, state, location_id, money, energy, hunger, social, data
                 FROM agents
                 WHERE id = ?1"
            }
            PreparedOp::ScanAgents => {
                "SELECT id, name, state, location_id, money, energy, hunger, social, data
                 FROM agents
                 ORDER BY id"
            }
            PreparedOp::InsertMemory => {
                "INSERT INTO memories (agent_id, tick, memory_text, type, importance, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            }
            PreparedOp::RecentMemories => {
                "SELECT memory_id, agent_id, tick, memory_text, type, importance, created_at
                 FROM memories
                 WHERE agent_id = ?1
                 ORDER BY tick DESC, memory_id DESC
                 LIMIT ?2"
            }
            PreparedOp::UpsertCheckpoint => {
                "INSERT OR REPLACE INTO checkpoints (tick, timestamp) VALUES (?1, ?2)"
            }
            PreparedOp::LatestCheckpoint => {
                "SELECT tick, timestamp FROM checkpoints ORDER BY tick DESC LIMIT 1"
            }
            PreparedOp::PruneEvents => "DELETE FROM simulation_events WHERE tick < ?1",
            PreparedOp::PruneMemories => "DELETE FROM memories WHERE tick < ?1",
        }
    }

    /// Statements that reference `memories.tick`.
    pub fn needs_memory_aging(self) -> bool {
        matches!(
            self,
            PreparedOp::InsertMemory | PreparedOp::RecentMemories | PreparedOp::PruneMemories
        )
    }
}

pub fn prepare(conn: &Connection, op: PreparedOp) -> Result<CachedStatement<'_>> {
    conn.prepare_cached(op.sql()).map_err(classify)
}

/// Prepare every statement on a fresh handle.
///
/// Returns the number of statements prepared. Memory statements that need the
/// aging column are left out when the table lacks it.
pub fn warm(conn: &Connection, memory_aging: bool) -> Result<usize> {
    conn.set_prepared_statement_cache_capacity(PreparedOp::ALL.len() * 2);
    let mut prepared = 0;
    for op in PreparedOp::ALL {
        if op.needs_memory_aging() && !memory_aging {
            continue;
        }
        prepare(conn, op)?;
        prepared += 1;
    }
    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_schema;

    #[test]
    fn test_all_statements_prepare() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(warm(&conn, true).unwrap(), PreparedOp::ALL.len());
    }

    #[test]
    fn test_warm_without_memory_aging() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let skipped = PreparedOp::ALL
            .iter()
            .filter(|op| op.needs_memory_aging())
            .count();
        assert_eq!(warm(&conn, false).unwrap(), PreparedOp::ALL.len() - skipped);
    }

    #[test]
    fn test_warm_fails_without_schema() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(warm(&conn, true).is_err());
    }
}
