use crate::classify;
use rusqlite::Connection;
use simvault_core::error::Result;

/// Create the four tables and their indexes if missing.
///
/// A `memories` table inherited from an older store may lack the `tick`
/// column; its tick indexes are skipped and pruning degrades (see
/// [`memory_has_aging_column`]).
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS agents (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            state TEXT NOT NULL,
            location_id TEXT,
            money REAL NOT NULL DEFAULT 0,
            energy REAL NOT NULL DEFAULT 0,
            hunger REAL NOT NULL DEFAULT 0,
            social REAL NOT NULL DEFAULT 0,
            data TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_agents_state ON agents(state);

        CREATE TABLE IF NOT EXISTS checkpoints (
            tick INTEGER PRIMARY KEY,
            timestamp TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS simulation_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tick INTEGER NOT NULL,
            type TEXT NOT NULL,
            data TEXT,
            timestamp TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_tick ON simulation_events(tick);

        CREATE TABLE IF NOT EXISTS memories (
            memory_id INTEGER PRIMARY KEY AUTOINCREMENT,
            agent_id TEXT NOT NULL,
            tick INTEGER NOT NULL,
            memory_text TEXT NOT NULL,
            type TEXT NOT NULL,
            importance REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );",
    )
    .map_err(classify)?;

    if memory_has_aging_column(conn)? {
        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_memories_agent_tick ON memories(agent_id, tick DESC);
             CREATE INDEX IF NOT EXISTS idx_memories_tick ON memories(tick);",
        )
        .map_err(classify)?;
    }

    Ok(())
}

/// Whether `memories` carries the `tick` column that pruning ages rows by.
pub fn memory_has_aging_column(conn: &Connection) -> Result<bool> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info('memories')")
        .map_err(classify)?;
    let mut rows = stmt.query([]).map_err(classify)?;
    while let Some(row) = rows.next().map_err(classify)? {
        let name: String = row.get(0).map_err(classify)?;
        if name.eq_ignore_ascii_case("tick") {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<String>>>()
            .unwrap()
    }

    #[test]
    fn test_init_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        // Idempotent
        init_schema(&conn).unwrap();

        let tables = table_names(&conn);
        for table in ["agents", "checkpoints", "memories", "simulation_events"] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
        assert!(memory_has_aging_column(&conn).unwrap());
    }

    #[test]
    fn test_legacy_memories_without_tick() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE memories (
                memory_id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id TEXT NOT NULL,
                memory_text TEXT NOT NULL,
                type TEXT NOT NULL,
                importance REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
        )
        .unwrap();

        init_schema(&conn).unwrap();
        assert!(!memory_has_aging_column(&conn).unwrap());

        let index_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_memories_tick'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(index_count, 0);
    }
}
