//! Memory record definitions.
//!
//! Defines [`MemoryEntry`] (a full row of the `memories` table),
//! [`ScoredEntry`] (an entry with its recall relevance), and [`Observation`]
//! (input to `learn`, which derives its own key).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Column list shared by every query that hydrates a [`MemoryEntry`].
pub(crate) const ENTRY_COLUMNS: &str =
    "key, value, namespace, created_at, updated_at, revision, access_count";

/// A stored fact, matching the `memories` table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique key.
    pub key: String,
    /// Arbitrary text. Learned observations store JSON here.
    pub value: String,
    /// Key prefix before the first `:`; empty for plain keys.
    pub namespace: String,
    /// RFC 3339 creation timestamp (microsecond precision).
    pub created_at: String,
    /// RFC 3339 last-write timestamp. Strictly increases across writes.
    pub updated_at: String,
    /// Logical clock value of the last write.
    pub revision: i64,
    /// Number of times this entry was returned by a tracked recall.
    pub access_count: i64,
}

impl MemoryEntry {
    /// Hydrate from a row selected with [`ENTRY_COLUMNS`].
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            value: row.get(1)?,
            namespace: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            revision: row.get(5)?,
            access_count: row.get(6)?,
        })
    }
}

/// A recall hit with its relevance score (0.0 when ordered by recency only).
#[derive(Debug, Clone, Serialize)]
pub struct ScoredEntry {
    #[serde(flatten)]
    pub entry: MemoryEntry,
    pub score: f64,
}

/// Namespace used when an observation names none.
pub const DEFAULT_NAMESPACE: &str = "learned";

/// Free-text observation to be stored under a derived key.
#[derive(Debug, Clone)]
pub struct Observation {
    pub namespace: String,
    pub text: String,
}

impl Observation {
    pub fn new(namespace: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            text: text.into(),
        }
    }

    /// `<namespace>:<first 16 hex chars of sha256(text)>`.
    pub fn key(&self) -> String {
        let digest = Sha256::digest(self.text.as_bytes());
        let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
        let namespace = if self.namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            self.namespace.as_str()
        };
        format!("{namespace}:{hex}")
    }
}

/// Namespace of a key: the prefix before the first `:`, if non-empty.
pub fn namespace_of(key: &str) -> &str {
    match key.find(':') {
        Some(idx) if idx > 0 => &key[..idx],
        _ => "",
    }
}
