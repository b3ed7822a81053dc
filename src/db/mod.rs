pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Open (or create) the memory database at the given path with pragmas,
/// schema, and migrations applied.
pub fn open_database(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    configure(&conn, busy_timeout)?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;

    tracing::debug!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Connection pragmas shared by every handle onto the store.
pub fn configure(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    // WAL lets readers proceed while a writer commits
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Every commit reaches the disk before the call returns
    conn.pragma_update(None, "synchronous", "FULL")?;
    Ok(())
}

/// Open the database, and if it fails its integrity check move the damaged
/// file aside and start a fresh store. Returns the connection and, when a
/// recovery happened, the quarantine path.
pub fn open_or_recover(
    path: impl AsRef<Path>,
    busy_timeout: Duration,
) -> Result<(Connection, Option<PathBuf>)> {
    let path = path.as_ref();
    match open_database(path, busy_timeout).and_then(|conn| {
        let ok = quick_check(&conn)?;
        Ok((conn, ok))
    }) {
        Ok((conn, true)) => Ok((conn, None)),
        Ok((conn, false)) => {
            drop(conn);
            let moved = quarantine(path)?;
            Ok((open_database(path, busy_timeout)?, Some(moved)))
        }
        Err(err) if path.exists() && is_corruption(&err) => {
            tracing::warn!(path = %path.display(), error = %err, "memory store unreadable");
            let moved = quarantine(path)?;
            Ok((open_database(path, busy_timeout)?, Some(moved)))
        }
        Err(err) => Err(err),
    }
}

/// `PRAGMA quick_check`: `true` when the page checksums and structure are sound.
pub fn quick_check(conn: &Connection) -> Result<bool> {
    let result: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    Ok(result == "ok")
}

fn is_corruption(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<rusqlite::Error>()
            .and_then(|e| e.sqlite_error_code())
            .is_some_and(|code| {
                matches!(
                    code,
                    rusqlite::ErrorCode::NotADatabase | rusqlite::ErrorCode::DatabaseCorrupt
                )
            })
    })
}

/// Rename a damaged database (and its WAL sidecars) out of the way.
fn quarantine(path: &Path) -> Result<PathBuf> {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let target = path.with_extension(format!("db.corrupt-{stamp}"));
    std::fs::rename(path, &target)
        .with_context(|| format!("failed to quarantine {}", path.display()))?;
    for suffix in ["-wal", "-shm"] {
        let sidecar = PathBuf::from(format!("{}{suffix}", path.display()));
        if sidecar.exists() {
            let _ = std::fs::remove_file(&sidecar);
        }
    }
    tracing::warn!(
        path = %path.display(),
        quarantined = %target.display(),
        "memory store failed integrity check, starting fresh"
    );
    Ok(target)
}

/// Health summary used by `warden doctor`.
#[derive(Debug, serde::Serialize)]
pub struct HealthReport {
    pub schema_version: u32,
    pub integrity_ok: bool,
    pub memory_count: i64,
    pub log_count: i64,
    pub revision: i64,
}

pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version = migrations::get_schema_version(conn)?;
    let integrity_ok = quick_check(conn)?;
    let memory_count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
    let log_count: i64 = conn.query_row("SELECT COUNT(*) FROM memory_log", [], |r| r.get(0))?;
    let revision: i64 =
        conn.query_row("SELECT revision FROM store_clock WHERE id = 1", [], |r| r.get(0))?;
    Ok(HealthReport {
        schema_version,
        integrity_ok,
        memory_count,
        log_count,
        revision,
    })
}

/// Open an in-memory database for testing.
#[cfg(test)]
pub fn open_memory_database() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;
    Ok(conn)
}
