//! Read path: candidate selection, lexical scoring, access tracking.
//!
//! ASCII queries pull candidates with `instr` on the lowercased key and
//! value. SQLite's `lower()` only folds ASCII, so any other query is matched
//! in Rust over the namespace-filtered rows. Ordering is score desc, `updated_at` desc, `revision` desc
//! so two recalls over an unchanged store always agree.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use super::types::{MemoryEntry, ScoredEntry, ENTRY_COLUMNS};
use crate::error::WardenResult;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_]{2,}").expect("token regex is valid"));

/// Upper bound on query tokens turned into SQL predicates.
const MAX_QUERY_TOKENS: usize = 8;

/// Lowest score of a whole-query substring hit.
const SUBSTRING_SCORE: f64 = 0.75;

/// Knobs for a single recall.
#[derive(Debug, Clone)]
pub struct RecallOptions {
    pub limit: usize,
    /// Bump `access_count` on returned entries. Internal readers turn this off.
    pub track_access: bool,
    pub namespace: Option<String>,
    pub exclude_namespaces: Vec<String>,
    /// Only whole-query substring hits; no token overlap.
    pub phrase: bool,
}

impl RecallOptions {
    pub fn page(limit: usize) -> Self {
        Self {
            limit,
            track_access: true,
            namespace: None,
            exclude_namespaces: Vec::new(),
            phrase: false,
        }
    }

    pub fn untracked(limit: usize) -> Self {
        Self {
            limit,
            track_access: false,
            namespace: None,
            exclude_namespaces: Vec::new(),
            phrase: false,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn excluding<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_namespaces
            .extend(namespaces.into_iter().map(Into::into));
        self
    }

    pub fn phrase(mut self) -> Self {
        self.phrase = true;
        self
    }
}

fn tokens(value: &str) -> HashSet<String> {
    TOKEN_RE
        .find_iter(value)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Lexical relevance of an entry for a query, in `[0, 1]`.
pub fn relevance(query: &str, key: &str, value: &str) -> f64 {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return 0.0;
    }
    let k = key.to_lowercase();
    let v = value.to_lowercase();
    if k == q {
        return 1.0;
    }
    if k.contains(&q) {
        return 0.9;
    }
    if v.contains(&q) {
        return SUBSTRING_SCORE;
    }
    let query_tokens = tokens(&q);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let hits = query_tokens
        .iter()
        .filter(|t| k.contains(t.as_str()) || v.contains(t.as_str()))
        .count();
    0.6 * hits as f64 / query_tokens.len() as f64
}

/// Ranked lookup. An empty query returns the most recently updated entries.
pub fn recall(conn: &Connection, query: &str, options: &RecallOptions) -> WardenResult<Vec<ScoredEntry>> {
    let query = query.trim();
    if options.limit == 0 {
        return Ok(Vec::new());
    }

    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(ns) = &options.namespace {
        values.push(Value::Text(ns.clone()));
        clauses.push(format!("namespace = ?{}", values.len()));
    }
    if !options.exclude_namespaces.is_empty() {
        let mut slots = Vec::with_capacity(options.exclude_namespaces.len());
        for ns in &options.exclude_namespaces {
            values.push(Value::Text(ns.clone()));
            slots.push(format!("?{}", values.len()));
        }
        clauses.push(format!("namespace NOT IN ({})", slots.join(", ")));
    }

    if query.is_empty() {
        values.push(Value::Integer(options.limit as i64));
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM memories {} \
             ORDER BY updated_at DESC, revision DESC LIMIT ?{}",
            where_clause(&clauses),
            values.len()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), MemoryEntry::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(rows
            .into_iter()
            .map(|entry| ScoredEntry { entry, score: 0.0 })
            .collect());
    }

    let lowered = query.to_lowercase();
    if lowered.is_ascii() {
        let mut needles = vec![lowered.clone()];
        if !options.phrase {
            let mut extra: Vec<String> = tokens(&lowered).into_iter().collect();
            extra.sort();
            needles.extend(extra.into_iter().take(MAX_QUERY_TOKENS));
        }

        let mut matchers = Vec::with_capacity(needles.len());
        for needle in needles {
            values.push(Value::Text(needle));
            let idx = values.len();
            matchers.push(format!(
                "instr(lower(key), ?{idx}) > 0 OR instr(lower(value), ?{idx}) > 0"
            ));
        }
        clauses.push(format!("({})", matchers.join(" OR ")));
    }

    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM memories {}",
        where_clause(&clauses)
    );
    let mut stmt = conn.prepare(&sql)?;
    let candidates = stmt
        .query_map(params_from_iter(values.iter()), MemoryEntry::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut scored: Vec<ScoredEntry> = candidates
        .into_iter()
        .filter_map(|entry| {
            let score = relevance(query, &entry.key, &entry.value);
            let floor = if options.phrase { SUBSTRING_SCORE } else { f64::MIN_POSITIVE };
            (score >= floor).then_some(ScoredEntry { entry, score })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.entry.updated_at.cmp(&a.entry.updated_at))
            .then_with(|| b.entry.revision.cmp(&a.entry.revision))
    });
    scored.truncate(options.limit);
    Ok(scored)
}

fn where_clause(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}

/// Increment `access_count` for returned keys. Leaves `updated_at` alone.
pub fn track_access(conn: &mut Connection, hits: &mut [ScoredEntry]) -> WardenResult<()> {
    if hits.is_empty() {
        return Ok(());
    }
    let tx = conn.transaction()?;
    {
        let mut stmt =
            tx.prepare("UPDATE memories SET access_count = access_count + 1 WHERE key = ?1")?;
        for hit in hits.iter_mut() {
            stmt.execute(params![hit.entry.key])?;
            hit.entry.access_count += 1;
        }
    }
    tx.commit()?;
    Ok(())
}
