//! Row-level operations against a live connection.
//!
//! Each function runs one unit of work on the handle it is given; retry,
//! circuit breaking and metrics live a layer up.

use crate::guard::QueryGuard;
use crate::statements::{prepare, PreparedOp};
use crate::classify;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use simvault_core::types::now_timestamp;
use simvault_core::{
    AgentRecord, AgentSummary, CheckpointRecord, DecodedAgent, MemoryRecord, NewMemory, Result,
    SimulationEvent, StoredEvent, Tick,
};

pub fn insert_event(conn: &Connection, event: &SimulationEvent) -> Result<i64> {
    let data = serde_json::to_string(&event.data)?;
    prepare(conn, PreparedOp::InsertEvent)?
        .execute(params![event.tick, event.kind, data, now_timestamp()])
        .map_err(classify)?;
    Ok(conn.last_insert_rowid())
}

/// Upsert a batch of agents in one transaction.
pub fn upsert_agents(conn: &mut Connection, agents: &[AgentRecord]) -> Result<usize> {
    // Encode first so a bad payload never leaves a half-written batch.
    let encoded = agents
        .iter()
        .map(|agent| agent.encoded_payload().map(|payload| (agent, payload)))
        .collect::<Result<Vec<_>>>()?;

    let tx = conn.transaction().map_err(classify)?;
    {
        let mut stmt = prepare(&tx, PreparedOp::UpsertAgent)?;
        for (agent, payload) in &encoded {
            let s = &agent.summary;
            stmt.execute(params![
                s.id,
                s.name,
                s.state,
                s.location_id,
                s.money,
                s.energy,
                s.hunger,
                s.social,
                payload
            ])
            .map_err(classify)?;
        }
    }
    tx.commit().map_err(classify)?;
    Ok(encoded.len())
}

pub fn insert_memory(conn: &Connection, memory: &NewMemory) -> Result<i64> {
    insert_memory_row(conn, memory, &now_timestamp())?;
    Ok(conn.last_insert_rowid())
}

/// Insert a batch of memories in one transaction.
pub fn insert_memories(conn: &mut Connection, memories: &[NewMemory]) -> Result<usize> {
    let created_at = now_timestamp();
    let tx = conn.transaction().map_err(classify)?;
    for memory in memories {
        insert_memory_row(&tx, memory, &created_at)?;
    }
    tx.commit().map_err(classify)?;
    Ok(memories.len())
}

fn insert_memory_row(conn: &Connection, memory: &NewMemory, created_at: &str) -> Result<()> {
    prepare(conn, PreparedOp::InsertMemory)?
        .execute(params![
            memory.agent_id,
            memory.tick,
            memory.text,
            memory.kind,
            memory.importance,
            created_at
        ])
        .map_err(classify)?;
    Ok(())
}

pub fn upsert_checkpoint(conn: &Connection, tick: Tick) -> Result<CheckpointRecord> {
    let record = CheckpointRecord {
        tick,
        timestamp: now_timestamp(),
    };
    prepare(conn, PreparedOp::UpsertCheckpoint)?
        .execute(params![record.tick, record.timestamp])
        .map_err(classify)?;
    Ok(record)
}

pub fn latest_checkpoint(conn: &Connection) -> Result<Option<CheckpointRecord>> {
    prepare(conn, PreparedOp::LatestCheckpoint)?
        .query_row([], |row| {
            Ok(CheckpointRecord {
                tick: row.get(0)?,
                timestamp: row.get(1)?,
            })
        })
        .optional()
        .map_err(classify)
}

pub fn list_agents(conn: &Connection, guard: &QueryGuard) -> Result<Vec<AgentSummary>> {
    let mut stmt = prepare(conn, PreparedOp::ListAgents)?;
    guard.collect("list_agents", &mut stmt, [], summary_from_row)
}

/// Light columns plus the raw payload column of one agent.
pub fn agent_full(conn: &Connection, id: &str) -> Result<Option<(AgentSummary, Option<String>)>> {
    prepare(conn, PreparedOp::AgentFull)?
        .query_row([id], |row| Ok((summary_from_row(row)?, row.get(8)?)))
        .optional()
        .map_err(classify)
}

pub fn recent_memories(
    conn: &Connection,
    guard: &QueryGuard,
    agent_id: &str,
    limit: usize,
) -> Result<Vec<MemoryRecord>> {
    let mut stmt = prepare(conn, PreparedOp::RecentMemories)?;
    guard.collect(
        "recent_memories",
        &mut stmt,
        params![agent_id, limit as i64],
        |row| {
            Ok(MemoryRecord {
                memory_id: row.get(0)?,
                agent_id: row.get(1)?,
                tick: row.get(2)?,
                text: row.get(3)?,
                kind: row.get(4)?,
                importance: row.get(5)?,
                created_at: row.get(6)?,
            })
        },
    )
}

/// Newest events first. Data that is not valid JSON comes back as a string.
pub fn recent_events(conn: &Connection, guard: &QueryGuard, limit: usize) -> Result<Vec<StoredEvent>> {
    let mut stmt = prepare(conn, PreparedOp::RecentEvents)?;
    guard.collect("recent_events", &mut stmt, [limit as i64], |row| {
        let raw: Option<String> = row.get(3)?;
        let data = match raw {
            None => Value::Null,
            Some(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        };
        Ok(StoredEvent {
            id: row.get(0)?,
            tick: row.get(1)?,
            kind: row.get(2)?,
            data,
            timestamp: row.get(4)?,
        })
    })
}

/// Stream every agent row, hydrating payloads one at a time.
///
/// Not bounded by the guard; only startup recovery calls this, on its own
/// read-only handle.
pub fn scan_agents(conn: &Connection) -> Result<Vec<DecodedAgent>> {
    let mut stmt = prepare(conn, PreparedOp::ScanAgents)?;
    let mut rows = stmt.query([]).map_err(classify)?;
    let mut agents = Vec::new();
    while let Some(row) = rows.next().map_err(classify)? {
        let summary = summary_from_row(row).map_err(classify)?;
        let raw: Option<String> = row.get(8).map_err(classify)?;
        agents.push(AgentRecord::hydrate(summary, raw.as_deref()));
    }
    Ok(agents)
}

/// Delete rows older than the cutoffs. Returns `(events, memories)` deleted.
///
/// `memory_cutoff` of `None` leaves memories alone.
pub fn prune(
    conn: &mut Connection,
    event_cutoff: Tick,
    memory_cutoff: Option<Tick>,
) -> Result<(usize, usize)> {
    let tx = conn.transaction().map_err(classify)?;
    let events = prepare(&tx, PreparedOp::PruneEvents)?
        .execute([event_cutoff])
        .map_err(classify)?;
    let memories = match memory_cutoff {
        Some(cutoff) => prepare(&tx, PreparedOp::PruneMemories)?
            .execute([cutoff])
            .map_err(classify)?,
        None => 0,
    };
    tx.commit().map_err(classify)?;
    Ok((events, memories))
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<AgentSummary> {
    Ok(AgentSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        state: row.get(2)?,
        location_id: row.get(3)?,
        money: row.get(4)?,
        energy: row.get(5)?,
        hunger: row.get(6)?,
        social: row.get(7)?,
    })
}
