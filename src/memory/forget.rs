//! Entry deletion.
//!
//! Removing a key that does not exist is a successful no-op and leaves no
//! audit record.

use rusqlite::{params, Connection, TransactionBehavior};

use super::store::{tick, write_audit_log};
use crate::error::WardenResult;

/// Delete `key`. Returns `true` when a row was removed.
pub fn forget(conn: &mut Connection, key: &str) -> WardenResult<bool> {
    let key = key.trim();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let removed = tx.execute("DELETE FROM memories WHERE key = ?1", params![key])?;
    if removed == 0 {
        tx.rollback()?;
        tracing::debug!(key, "forget: key not present");
        return Ok(false);
    }

    let (revision, stamp) = tick(&tx)?;
    write_audit_log(&tx, "delete", key, revision, &stamp)?;
    tx.commit()?;

    tracing::debug!(key, revision, "memory forgotten");
    Ok(true)
}
