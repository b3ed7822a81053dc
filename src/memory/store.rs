//! Write path: logical clock, upsert, and audit logging.
//!
//! [`remember`] is the single insert/update entry point. It runs inside a
//! `BEGIN IMMEDIATE` transaction so concurrent writers serialize on the
//! database lock: tick the store clock, upsert the row, append to the audit
//! log, then commit.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::types::{namespace_of, MemoryEntry, ENTRY_COLUMNS};
use crate::error::{WardenError, WardenResult};

/// Insert or replace `key`. Returns the stored entry.
pub fn remember(conn: &mut Connection, key: &str, value: &str) -> WardenResult<MemoryEntry> {
    let key = key.trim();
    if key.is_empty() {
        return Err(WardenError::InvalidInput("memory key must not be empty".into()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let (revision, stamp) = tick(&tx)?;

    let existed: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM memories WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )?;

    tx.execute(
        "INSERT INTO memories (key, value, namespace, created_at, updated_at, revision, access_count)
         VALUES (?1, ?2, ?3, ?4, ?4, ?5, 0)
         ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             updated_at = excluded.updated_at,
             revision = excluded.revision",
        params![key, value, namespace_of(key), stamp, revision],
    )?;

    let operation = if existed { "update" } else { "create" };
    write_audit_log(&tx, operation, key, revision, &stamp)?;

    let entry = fetch(&tx, key)?.ok_or_else(|| {
        WardenError::storage("remember", format!("row for {key} vanished inside transaction"))
    })?;
    tx.commit()?;

    tracing::debug!(key, revision, operation, "memory written");
    Ok(entry)
}

/// Read a single entry without touching its access count.
pub fn fetch(conn: &Connection, key: &str) -> WardenResult<Option<MemoryEntry>> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM memories WHERE key = ?1");
    Ok(conn
        .query_row(&sql, params![key], MemoryEntry::from_row)
        .optional()?)
}

/// Advance the store clock by one revision.
///
/// The returned timestamp is `max(now, last + 1µs)` so `updated_at` strictly
/// increases even when the wall clock stalls or steps backwards.
pub(crate) fn tick(conn: &Connection) -> WardenResult<(i64, String)> {
    let (last_revision, last_stamp): (i64, String) = conn.query_row(
        "SELECT revision, last_updated_at FROM store_clock WHERE id = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let now = Utc::now().timestamp_micros();
    let next = match DateTime::parse_from_rfc3339(&last_stamp) {
        Ok(prev) => now.max(prev.timestamp_micros() + 1),
        Err(_) => now,
    };
    let stamp = format_micros(next)?;
    let revision = last_revision + 1;

    conn.execute(
        "UPDATE store_clock SET revision = ?1, last_updated_at = ?2 WHERE id = 1",
        params![revision, stamp],
    )?;
    Ok((revision, stamp))
}

fn format_micros(micros: i64) -> WardenResult<String> {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true))
        .ok_or_else(|| WardenError::storage("clock", format!("timestamp out of range: {micros}")))
}

/// Append an entry to the `memory_log` audit table.
pub(crate) fn write_audit_log(
    conn: &Connection,
    operation: &str,
    key: &str,
    revision: i64,
    stamp: &str,
) -> WardenResult<()> {
    conn.execute(
        "INSERT INTO memory_log (operation, memory_key, revision, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![operation, key, revision, stamp],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;

    #[test]
    fn remember_creates_then_updates() {
        let mut conn = open_memory_database().unwrap();
        let first = remember(&mut conn, "style:indent", "4 spaces").unwrap();
        assert_eq!(first.revision, 1);
        assert_eq!(first.created_at, first.updated_at);

        let second = remember(&mut conn, "style:indent", "tabs").unwrap();
        assert_eq!(second.value, "tabs");
        assert_eq!(second.namespace, "style");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert!(second.revision > first.revision);

        let ops: Vec<String> = conn
            .prepare("SELECT operation FROM memory_log ORDER BY id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ops, vec!["create", "update"]);
    }

    #[test]
    fn empty_key_is_rejected() {
        let mut conn = open_memory_database().unwrap();
        let err = remember(&mut conn, "   ", "x").unwrap_err();
        assert!(matches!(err, WardenError::InvalidInput(_)));
    }

    #[test]
    fn clock_survives_future_timestamp() {
        let conn = open_memory_database().unwrap();
        conn.execute(
            "UPDATE store_clock SET last_updated_at = '2999-01-01T00:00:00.000000Z' WHERE id = 1",
            [],
        )
        .unwrap();
        let (rev, stamp) = tick(&conn).unwrap();
        assert_eq!(rev, 1);
        assert_eq!(stamp, "2999-01-01T00:00:00.000001Z");
    }

    #[test]
    fn rapid_writes_have_strictly_increasing_stamps() {
        let mut conn = open_memory_database().unwrap();
        let mut last = String::new();
        for i in 0..50 {
            let e = remember(&mut conn, &format!("k{i}"), "v").unwrap();
            assert!(e.updated_at > last);
            last = e.updated_at;
        }
    }
}
