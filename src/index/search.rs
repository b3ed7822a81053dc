//! Symbol and path search over an index snapshot.
//!
//! [`IndexSearch`] pins the snapshot it was created from, ranks on first use,
//! and can be iterated any number of times with identical results.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use serde::Serialize;

use super::graph::IndexGraph;

pub const MAX_QUERY_LENGTH: usize = 512;

/// Split identifiers and paths into lowercase words (`parseHTTPRequest` → parse, http, request).
fn words(value: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    for part in value.split(|c: char| !c.is_ascii_alphanumeric()) {
        let chars: Vec<char> = part.chars().collect();
        let mut start = 0;
        for i in 1..chars.len() {
            let prev = chars[i - 1];
            let cur = chars[i];
            let next_lower = chars.get(i + 1).is_some_and(|c| c.is_ascii_lowercase());
            let hump = (prev.is_ascii_lowercase() || prev.is_ascii_digit()) && cur.is_ascii_uppercase();
            let acronym_end = prev.is_ascii_uppercase() && cur.is_ascii_uppercase() && next_lower;
            if hump || acronym_end {
                out.insert(chars[start..i].iter().collect::<String>().to_lowercase());
                start = i;
            }
        }
        if start < chars.len() {
            out.insert(chars[start..].iter().collect::<String>().to_lowercase());
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    pub line: u32,
    pub score: f64,
}

fn symbol_score(query: &str, query_words: &HashSet<String>, name: &str, path: &str) -> f64 {
    let n = name.to_lowercase();
    if n == query {
        return 1.0;
    }
    if n.contains(query) {
        return 0.9;
    }
    if query_words.is_empty() {
        return 0.0;
    }
    let mut target = words(name);
    target.extend(words(path));
    let overlap = query_words.intersection(&target).count();
    0.8 * overlap as f64 / query_words.len() as f64
}

fn path_score(query: &str, query_words: &HashSet<String>, path: &str) -> f64 {
    let p = path.to_lowercase();
    if p == query {
        return 1.0;
    }
    if p.contains(query) {
        return 0.85;
    }
    if query_words.is_empty() {
        return 0.0;
    }
    let overlap = query_words.intersection(&words(path)).count();
    0.7 * overlap as f64 / query_words.len() as f64
}

pub struct IndexSearch {
    graph: Arc<IndexGraph>,
    query: String,
    ranked: OnceLock<Vec<SearchHit>>,
}

impl IndexSearch {
    pub fn new(graph: Arc<IndexGraph>, query: &str) -> Self {
        let trimmed = query.trim();
        let mut end = trimmed.len().min(MAX_QUERY_LENGTH);
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        Self {
            graph,
            query: trimmed[..end].to_string(),
            ranked: OnceLock::new(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Generation of the snapshot being searched.
    pub fn generation(&self) -> u64 {
        self.graph.generation()
    }

    /// A fresh pass over the ranked hits.
    pub fn iter(&self) -> std::slice::Iter<'_, SearchHit> {
        self.ranked().iter()
    }

    fn ranked(&self) -> &[SearchHit] {
        self.ranked.get_or_init(|| rank(&self.graph, &self.query))
    }
}

impl<'a> IntoIterator for &'a IndexSearch {
    type Item = &'a SearchHit;
    type IntoIter = std::slice::Iter<'a, SearchHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn rank(graph: &IndexGraph, query: &str) -> Vec<SearchHit> {
    let q = query.to_lowercase();
    if q.is_empty() {
        return Vec::new();
    }
    let query_words = words(query);
    let mut hits = Vec::new();

    for file in graph.files() {
        let score = path_score(&q, &query_words, &file.path);
        if score > 0.0 {
            hits.push(SearchHit {
                path: file.path.clone(),
                symbol: None,
                kind: None,
                line: 0,
                score,
            });
        }
    }

    for sym in graph.symbols() {
        let Some(file) = graph.file(sym.file) else {
            continue;
        };
        let score = symbol_score(&q, &query_words, &sym.name, &file.path);
        if score > 0.0 {
            hits.push(SearchHit {
                path: file.path.clone(),
                symbol: Some(sym.name.clone()),
                kind: Some(sym.kind.as_str()),
                line: sym.line,
                score,
            });
        }
    }

    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.line.cmp(&b.line))
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    hits
}
