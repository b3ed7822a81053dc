//! In-memory file/symbol graph.
//!
//! Records live in ordered maps keyed by opaque integer IDs. IDs are never
//! reused within a graph's lifetime, so a stale ID simply fails to resolve.
//! Reference edges are derived by name: a file references a symbol when it
//! uses the symbol's name and the symbol is declared in a different file.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::parser::{Marker, ParsedSource, SymbolKind};

/// Per-file change history kept on each record.
const MAX_CHANGES_PER_FILE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub generation: u64,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    /// Root-relative, `/`-separated.
    pub path: String,
    /// SHA-256 hex of the raw bytes.
    pub content_hash: String,
    pub scanned_at: DateTime<Utc>,
    pub language: String,
    pub size_bytes: u64,
    pub declares: BTreeSet<SymbolId>,
    pub references: BTreeSet<SymbolId>,
    pub referenced_names: BTreeSet<String>,
    pub markers: Vec<Marker>,
    pub changes: Vec<Change>,
    pub parse_error: Option<String>,
}

impl FileRecord {
    /// Number of recorded changes with `generation > since`.
    pub fn changes_since(&self, since: u64) -> usize {
        self.changes.iter().filter(|c| c.generation > since).count()
    }

    pub fn last_changed(&self) -> u64 {
        self.changes.last().map(|c| c.generation).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file: FileId,
    pub line: u32,
    pub referenced_by: BTreeSet<FileId>,
}

/// The fresh content of one file, ready to merge into the graph.
#[derive(Debug, Clone)]
pub struct FileUpdate {
    pub path: String,
    pub content_hash: String,
    pub language: String,
    pub size_bytes: u64,
    pub parsed: ParsedSource,
    pub parse_error: Option<String>,
}

/// Serialized form. Lookup maps are rebuilt on load.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct GraphData {
    generation: u64,
    last_scan_at: Option<DateTime<Utc>>,
    next_file_id: u32,
    next_symbol_id: u32,
    files: Vec<FileRecord>,
    symbols: Vec<Symbol>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexGraph {
    generation: u64,
    last_scan_at: Option<DateTime<Utc>>,
    next_file_id: u32,
    next_symbol_id: u32,
    files: BTreeMap<FileId, FileRecord>,
    paths: BTreeMap<String, FileId>,
    symbols: BTreeMap<SymbolId, Symbol>,
    by_name: BTreeMap<String, BTreeSet<SymbolId>>,
}

impl IndexGraph {
    /// Increments once per scan that changed something.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_scan_at(&self) -> Option<DateTime<Utc>> {
        self.last_scan_at
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    /// Files ordered by path.
    pub fn files_by_path(&self) -> impl Iterator<Item = &FileRecord> {
        self.paths.values().filter_map(|id| self.files.get(id))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn file(&self, id: FileId) -> Option<&FileRecord> {
        self.files.get(&id)
    }

    pub fn file_by_path(&self, path: &str) -> Option<&FileRecord> {
        self.paths.get(path).and_then(|id| self.files.get(id))
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(&id)
    }

    /// Files that reference any symbol `file` declares, excluding itself.
    pub fn referencers(&self, file: &FileRecord) -> BTreeSet<FileId> {
        file.declares
            .iter()
            .filter_map(|sid| self.symbols.get(sid))
            .flat_map(|sym| sym.referenced_by.iter().copied())
            .filter(|fid| *fid != file.id)
            .collect()
    }

    /// Files declaring a symbol that `file` references.
    pub fn dependencies(&self, file: &FileRecord) -> BTreeSet<FileId> {
        file.references
            .iter()
            .filter_map(|sid| self.symbols.get(sid))
            .map(|sym| sym.file)
            .filter(|fid| *fid != file.id)
            .collect()
    }

    /// Start a new generation. Called once per mutating scan.
    pub(crate) fn begin_generation(&mut self, at: DateTime<Utc>) -> u64 {
        self.generation += 1;
        self.last_scan_at = Some(at);
        self.generation
    }

    /// Insert or replace the record at `update.path`. Returns whether the file was new.
    pub(crate) fn apply(&mut self, update: FileUpdate, at: DateTime<Utc>) -> ChangeKind {
        let (id, kind, mut changes) = match self.paths.get(&update.path).copied() {
            Some(id) => {
                let previous = self.files.remove(&id);
                let changes = match previous {
                    Some(prev) => {
                        for sid in &prev.declares {
                            self.symbols.remove(sid);
                        }
                        prev.changes
                    }
                    None => Vec::new(),
                };
                (id, ChangeKind::Modified, changes)
            }
            None => {
                let id = FileId(self.next_file_id);
                self.next_file_id += 1;
                self.paths.insert(update.path.clone(), id);
                (id, ChangeKind::Added, Vec::new())
            }
        };

        changes.push(Change {
            generation: self.generation,
            kind,
        });
        if changes.len() > MAX_CHANGES_PER_FILE {
            let excess = changes.len() - MAX_CHANGES_PER_FILE;
            changes.drain(..excess);
        }

        let mut declares = BTreeSet::new();
        for decl in &update.parsed.declarations {
            let sid = SymbolId(self.next_symbol_id);
            self.next_symbol_id += 1;
            self.symbols.insert(
                sid,
                Symbol {
                    id: sid,
                    name: decl.name.clone(),
                    qualified_name: format!("{}::{}", update.path, decl.name),
                    kind: decl.kind,
                    file: id,
                    line: decl.line,
                    referenced_by: BTreeSet::new(),
                },
            );
            declares.insert(sid);
        }

        self.files.insert(
            id,
            FileRecord {
                id,
                path: update.path,
                content_hash: update.content_hash,
                scanned_at: at,
                language: update.language,
                size_bytes: update.size_bytes,
                declares,
                references: BTreeSet::new(),
                referenced_names: update.parsed.references,
                markers: update.parsed.markers,
                changes,
                parse_error: update.parse_error,
            },
        );
        kind
    }

    /// Drop a file and the symbols it declares. Returns `false` if unknown.
    pub(crate) fn remove(&mut self, path: &str) -> bool {
        let Some(id) = self.paths.remove(path) else {
            return false;
        };
        if let Some(record) = self.files.remove(&id) {
            for sid in &record.declares {
                self.symbols.remove(sid);
            }
        }
        true
    }

    /// Recompute every reference edge from the recorded names.
    pub(crate) fn relink(&mut self) {
        self.by_name.clear();
        for sym in self.symbols.values_mut() {
            sym.referenced_by.clear();
            self.by_name.entry(sym.name.clone()).or_default().insert(sym.id);
        }

        let mut edges: Vec<(FileId, SymbolId)> = Vec::new();
        for file in self.files.values() {
            for name in &file.referenced_names {
                if let Some(targets) = self.by_name.get(name) {
                    for sid in targets {
                        if self.symbols.get(sid).is_some_and(|s| s.file != file.id) {
                            edges.push((file.id, *sid));
                        }
                    }
                }
            }
        }

        for file in self.files.values_mut() {
            file.references.clear();
        }
        for (fid, sid) in edges {
            if let Some(file) = self.files.get_mut(&fid) {
                file.references.insert(sid);
            }
            if let Some(sym) = self.symbols.get_mut(&sid) {
                sym.referenced_by.insert(fid);
            }
        }
    }

    pub(crate) fn to_data(&self) -> GraphData {
        GraphData {
            generation: self.generation,
            last_scan_at: self.last_scan_at,
            next_file_id: self.next_file_id,
            next_symbol_id: self.next_symbol_id,
            files: self.files.values().cloned().collect(),
            symbols: self.symbols.values().cloned().collect(),
        }
    }

    pub(crate) fn from_data(data: GraphData) -> Self {
        let mut graph = IndexGraph {
            generation: data.generation,
            last_scan_at: data.last_scan_at,
            next_file_id: data.next_file_id,
            next_symbol_id: data.next_symbol_id,
            ..IndexGraph::default()
        };
        for file in data.files {
            graph.paths.insert(file.path.clone(), file.id);
            graph.files.insert(file.id, file);
        }
        for sym in data.symbols {
            graph
                .by_name
                .entry(sym.name.clone())
                .or_default()
                .insert(sym.id);
            graph.symbols.insert(sym.id, sym);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::parser::{LanguageParser, RustParser};

    fn update(path: &str, src: &str) -> FileUpdate {
        FileUpdate {
            path: path.to_string(),
            content_hash: format!("hash-{}", src.len()),
            language: "rust".into(),
            size_bytes: src.len() as u64,
            parsed: RustParser.parse(src),
            parse_error: None,
        }
    }

    fn graph_with(files: &[(&str, &str)]) -> IndexGraph {
        let mut graph = IndexGraph::default();
        let now = Utc::now();
        graph.begin_generation(now);
        for (path, src) in files {
            graph.apply(update(path, src), now);
        }
        graph.relink();
        graph
    }

    #[test]
    fn references_resolve_across_files() {
        let graph = graph_with(&[
            ("a.rs", "pub fn alpha() {}\n"),
            ("b.rs", "fn beta() { alpha(); }\n"),
        ]);
        let a = graph.file_by_path("a.rs").unwrap();
        let b = graph.file_by_path("b.rs").unwrap();
        assert_eq!(graph.referencers(a), BTreeSet::from([b.id]));
        assert_eq!(graph.dependencies(b), BTreeSet::from([a.id]));
        assert!(graph.referencers(b).is_empty());
    }

    #[test]
    fn replacing_a_file_drops_its_old_symbols() {
        let mut graph = graph_with(&[("a.rs", "pub fn alpha() {}\npub fn gamma() {}\n")]);
        assert_eq!(graph.symbol_count(), 2);

        graph.begin_generation(Utc::now());
        let kind = graph.apply(update("a.rs", "pub fn alpha() {}\n"), Utc::now());
        graph.relink();
        assert_eq!(kind, ChangeKind::Modified);
        assert_eq!(graph.symbol_count(), 1);
        let record = graph.file_by_path("a.rs").unwrap();
        assert_eq!(record.changes.len(), 2);
        assert_eq!(record.last_changed(), 2);
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let mut graph = graph_with(&[("a.rs", "fn one() {}\n")]);
        let old = graph.file_by_path("a.rs").unwrap().id;
        assert!(graph.remove("a.rs"));
        assert!(!graph.remove("a.rs"));
        graph.apply(update("a.rs", "fn one() {}\n"), Utc::now());
        assert_ne!(graph.file_by_path("a.rs").unwrap().id, old);
        assert!(graph.file(old).is_none());
    }

    #[test]
    fn data_round_trip_preserves_graph() {
        let graph = graph_with(&[
            ("a.rs", "pub fn alpha() {}\n"),
            ("b.rs", "fn beta() { alpha(); }\n"),
        ]);
        let restored = IndexGraph::from_data(graph.to_data());
        assert_eq!(restored, graph);
    }
}
