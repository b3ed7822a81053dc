//! Durable key/value memory with an audit log.
//!
//! [`MemoryStore`] is the handle the rest of the crate uses. It opens a fresh
//! SQLite connection per operation, so two handles (or two processes) can work
//! against the same file; writes serialize on SQLite's own lock.

pub mod forget;
pub mod search;
pub mod store;
pub mod types;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection};

use crate::db;
use crate::error::{WardenError, WardenResult};
use search::RecallOptions;
use types::{MemoryEntry, Observation, ScoredEntry, ENTRY_COLUMNS};

/// File name of the store inside the data directory.
pub const DB_FILE_NAME: &str = "memory.db";

#[derive(Debug, Clone)]
pub struct MemoryStore {
    path: PathBuf,
    busy_timeout: Duration,
    page_size: usize,
}

impl MemoryStore {
    /// Open (creating or recovering if needed) the store at `path`.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration, page_size: usize) -> WardenResult<Self> {
        let path = path.as_ref().to_path_buf();
        let (_, quarantined) = db::open_or_recover(&path, busy_timeout)
            .map_err(|e| WardenError::storage("open memory store", format!("{e:#}")))?;
        if let Some(moved) = quarantined {
            tracing::warn!(quarantined = %moved.display(), "memory store was rebuilt");
        }
        Ok(Self {
            path,
            busy_timeout,
            page_size: page_size.max(1),
        })
    }

    /// Open the store inside a data directory.
    pub fn open_in(data_dir: &Path, busy_timeout: Duration, page_size: usize) -> WardenResult<Self> {
        Self::open(data_dir.join(DB_FILE_NAME), busy_timeout, page_size)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub(crate) fn connect(&self) -> WardenResult<Connection> {
        let conn = Connection::open(&self.path)?;
        db::configure(&conn, self.busy_timeout)?;
        Ok(conn)
    }

    pub fn remember(&self, key: &str, value: &str) -> WardenResult<MemoryEntry> {
        let mut conn = self.connect()?;
        store::remember(&mut conn, key, value)
    }

    /// User-facing recall: one page, access tracked.
    pub fn recall(&self, query: &str) -> WardenResult<Vec<ScoredEntry>> {
        self.recall_with(query, &RecallOptions::page(self.page_size))
    }

    pub fn recall_with(&self, query: &str, options: &RecallOptions) -> WardenResult<Vec<ScoredEntry>> {
        let mut conn = self.connect()?;
        let mut hits = search::recall(&conn, query, options)?;
        if options.track_access {
            search::track_access(&mut conn, &mut hits)?;
        }
        Ok(hits)
    }

    pub fn forget(&self, key: &str) -> WardenResult<bool> {
        let mut conn = self.connect()?;
        forget::forget(&mut conn, key)
    }

    /// Store a free-text observation under its derived key.
    pub fn learn(&self, observation: &Observation) -> WardenResult<MemoryEntry> {
        self.remember(&observation.key(), &observation.text)
    }

    pub fn get(&self, key: &str) -> WardenResult<Option<MemoryEntry>> {
        let conn = self.connect()?;
        store::fetch(&conn, key)
    }

    /// Newest entries of one namespace, without access tracking.
    pub fn recent_in_namespace(&self, namespace: &str, limit: usize) -> WardenResult<Vec<MemoryEntry>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM memories WHERE namespace = ?1 \
             ORDER BY updated_at DESC, revision DESC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![namespace, limit as i64], MemoryEntry::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn health(&self) -> WardenResult<db::HealthReport> {
        let conn = self.connect()?;
        db::check_database_health(&conn).map_err(|e| WardenError::storage("health check", format!("{e:#}")))
    }
}
