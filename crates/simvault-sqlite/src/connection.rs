use crate::{classify, schema, statements};
use rusqlite::{Connection, OpenFlags};
use simvault_core::config::sidecar;
use simvault_core::{Result, SimVaultError, StorageSizes, StoreConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What `connect()` had to do about a corrupt store file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorruptionRecovery {
    /// The corrupt file was moved aside and the daily backup copied into place.
    RestoredFromBackup { quarantined: PathBuf, backup: PathBuf },
    /// The corrupt file was moved aside and no usable backup existed.
    FreshStore { quarantined: PathBuf },
}

impl CorruptionRecovery {
    pub fn quarantined(&self) -> &Path {
        match self {
            CorruptionRecovery::RestoredFromBackup { quarantined, .. } => quarantined,
            CorruptionRecovery::FreshStore { quarantined } => quarantined,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectReport {
    /// Incremented on every successful connect; a new value means every
    /// prepared statement was rebuilt on a new handle.
    pub generation: u64,
    pub recovery: Option<CorruptionRecovery>,
    pub memory_aging: bool,
}

/// Result of `PRAGMA wal_checkpoint`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalCheckpoint {
    /// A reader or writer prevented the checkpoint from completing
    pub busy: bool,
    pub log_frames: i64,
    pub checkpointed_frames: i64,
}

/// Owner of the single live SQLite handle
///
/// At most one handle exists at a time. Reconnecting replaces it wholesale,
/// together with its statement cache.
pub struct ConnectionManager {
    config: StoreConfig,
    conn: Option<Connection>,
    generation: u64,
    memory_aging: bool,
}

impl ConnectionManager {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            conn: None,
            generation: 0,
            memory_aging: false,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `memories` can be pruned by tick.
    pub fn memory_aging(&self) -> bool {
        self.memory_aging
    }

    /// Open the store, recovering from corruption on the way.
    ///
    /// A file that fails `PRAGMA quick_check` is quarantined and replaced by
    /// the daily backup, or by a fresh store when there is none. An open that
    /// still fails after that is returned as [`SimVaultError::Connection`].
    pub fn connect(&mut self) -> Result<ConnectReport> {
        ensure_parent_dir(&self.config.path)?;

        let recovery = match check_integrity(&self.config.path) {
            Ok(()) => None,
            Err(SimVaultError::Corruption(reason)) => {
                warn!(
                    path = %self.config.path.display(),
                    reason = %reason,
                    "Store failed integrity check, quarantining"
                );
                Some(recover_corrupt_store(&self.config)?)
            }
            Err(e) => return Err(SimVaultError::Connection(e.to_string())),
        };

        let conn = open_tuned(&self.config)?;
        schema::init_schema(&conn).map_err(|e| SimVaultError::Connection(e.to_string()))?;
        let memory_aging = schema::memory_has_aging_column(&conn)?;
        let prepared = statements::warm(&conn, memory_aging)
            .map_err(|e| SimVaultError::Connection(e.to_string()))?;

        // Publish the new handle only once it is fully usable.
        if let Some(old) = self.conn.replace(conn) {
            close_quietly(old);
        }
        self.generation += 1;
        self.memory_aging = memory_aging;

        info!(
            path = %self.config.path.display(),
            generation = self.generation,
            prepared,
            recovered = recovery.is_some(),
            "Store connected"
        );

        Ok(ConnectReport {
            generation: self.generation,
            recovery,
            memory_aging,
        })
    }

    /// Drop the current handle (ignoring close errors) and connect again.
    pub fn reconnect(&mut self) -> Result<ConnectReport> {
        self.close();
        self.connect()
    }

    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            close_quietly(conn);
        }
    }

    pub fn connection(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| SimVaultError::Connection("store is not connected".into()))
    }

    pub fn connection_mut(&mut self) -> Result<&mut Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| SimVaultError::Connection("store is not connected".into()))
    }

    /// Trivial round trip used by health probes.
    pub fn probe(&self) -> Result<()> {
        let conn = self.connection()?;
        let one: i64 = statements::prepare(conn, statements::PreparedOp::Probe)?
            .query_row([], |row| row.get(0))
            .map_err(classify)?;
        if one != 1 {
            return Err(SimVaultError::Connection(format!(
                "probe returned {} instead of 1",
                one
            )));
        }
        Ok(())
    }

    /// Merge the write-ahead log back and truncate it to zero bytes.
    pub fn checkpoint_wal(&self) -> Result<WalCheckpoint> {
        let conn = self.connection()?;
        let result = conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
                Ok(WalCheckpoint {
                    busy: row.get::<_, i64>(0)? != 0,
                    log_frames: row.get(1)?,
                    checkpointed_frames: row.get(2)?,
                })
            })
            .map_err(classify)?;
        debug!(
            busy = result.busy,
            log_frames = result.log_frames,
            checkpointed = result.checkpointed_frames,
            "WAL checkpoint"
        );
        Ok(result)
    }

    pub fn storage_sizes(&self) -> StorageSizes {
        StorageSizes {
            db_bytes: file_len(&self.config.path),
            wal_bytes: file_len(&self.config.wal_path()),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open an independent read-only handle, used by isolated workers.
pub fn open_read_only(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if !path.is_file() {
        return Err(SimVaultError::NotFound(format!(
            "store file {} does not exist",
            path.display()
        )));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| SimVaultError::Connection(e.to_string()))?;
    conn.busy_timeout(busy_timeout).map_err(classify)?;
    Ok(conn)
}

/// Run `PRAGMA quick_check` against an existing store file.
///
/// Missing files pass (a fresh store will be created). Any answer other than
/// `ok`, or an engine error classified as corruption, yields
/// [`SimVaultError::Corruption`].
pub fn check_integrity(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(classify)?;
    let verdict: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(classify)?;
    close_quietly(conn);

    if verdict.eq_ignore_ascii_case("ok") {
        Ok(())
    } else {
        Err(SimVaultError::Corruption(verdict))
    }
}

/// Quarantine the corrupt store and put the daily backup in its place.
pub fn recover_corrupt_store(config: &StoreConfig) -> Result<CorruptionRecovery> {
    let quarantined = quarantine(&config.path)?;
    warn!(
        quarantined = %quarantined.display(),
        "Corrupt store moved aside"
    );

    let backup = config.daily_backup_path();
    if !backup.is_file() {
        warn!(
            backup = %backup.display(),
            "No backup available, starting from an empty store"
        );
        return Ok(CorruptionRecovery::FreshStore { quarantined });
    }

    fs::copy(&backup, &config.path).map_err(|e| {
        SimVaultError::Connection(format!(
            "failed to restore {} from {}: {}",
            config.path.display(),
            backup.display(),
            e
        ))
    })?;

    if let Err(e) = check_integrity(&config.path) {
        warn!(
            backup = %backup.display(),
            error = %e,
            "Restored backup is unusable, starting from an empty store"
        );
        quarantine(&config.path)?;
        return Ok(CorruptionRecovery::FreshStore { quarantined });
    }

    info!(backup = %backup.display(), "Store restored from backup");
    Ok(CorruptionRecovery::RestoredFromBackup {
        quarantined,
        backup,
    })
}

/// Rename `path` (and its `-wal`/`-shm` sidecars) to `<path>.corrupt.<timestamp>`.
pub fn quarantine(path: &Path) -> Result<PathBuf> {
    let stamp = chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        .replace(':', "-");
    let mut target = sidecar(path, &format!(".corrupt.{}", stamp));
    let mut n = 1;
    while target.exists() {
        target = sidecar(path, &format!(".corrupt.{}.{}", stamp, n));
        n += 1;
    }

    fs::rename(path, &target).map_err(|e| {
        SimVaultError::Connection(format!("failed to quarantine {}: {}", path.display(), e))
    })?;
    for suffix in ["-wal", "-shm"] {
        let side = sidecar(path, suffix);
        if side.exists() {
            fs::rename(&side, sidecar(&target, suffix))?;
        }
    }
    Ok(target)
}

fn open_tuned(config: &StoreConfig) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        &config.path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| SimVaultError::Connection(e.to_string()))?;

    configure_connection(&conn, config).map_err(|e| SimVaultError::Connection(e.to_string()))?;
    Ok(conn)
}

/// WAL, relaxed-but-safe sync, page cache, and a native lock-wait timeout.
fn configure_connection(conn: &Connection, config: &StoreConfig) -> rusqlite::Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        warn!(mode = %mode, "Store did not switch to WAL journal mode");
    }
    conn.pragma_update(None, "synchronous", config.synchronous.pragma_value())?;
    conn.pragma_update(None, "cache_size", config.cache_size)?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                SimVaultError::Connection(format!(
                    "failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

fn close_quietly(conn: Connection) {
    if let Err((_conn, e)) = conn.close() {
        warn!(error = %e, "Ignoring error while closing store handle");
    }
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
