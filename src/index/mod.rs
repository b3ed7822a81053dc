//! Incremental project index.
//!
//! [`ProjectIndex`] owns the file/symbol graph for one root. Scans hash every
//! file, re-parse only what changed, and publish a fully built graph by
//! swapping an `Arc`, so readers never see a half-applied scan.

pub mod graph;
pub mod impact;
pub mod parser;
pub mod scanner;
pub mod search;
pub mod snapshot;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::IndexConfig;
use crate::error::{WardenError, WardenResult};
use graph::{ChangeKind, FileUpdate, IndexGraph};
use impact::ImpactReport;
use parser::ParserRegistry;
use scanner::{FileScanner, ScanLock, WalkedFile};
use search::IndexSearch;
use snapshot::SnapshotProblem;

/// Cooperative cancellation flag, checked between per-file units.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanDiagnostic {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    /// Added and modified paths, sorted.
    pub changed: Vec<String>,
    pub removed_paths: Vec<String>,
    pub errors: Vec<ScanDiagnostic>,
    pub generation: u64,
    pub files: usize,
}

impl ScanResult {
    pub fn is_unchanged(&self) -> bool {
        self.added == 0 && self.modified == 0 && self.removed == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TodoItem {
    pub path: String,
    pub line: u32,
    pub tag: String,
    pub text: String,
}

/// Result of one per-file unit.
enum FileOutcome {
    Unchanged,
    Changed(FileUpdate, Option<ScanDiagnostic>),
    Unreadable(ScanDiagnostic),
}

pub struct ProjectIndex {
    root: PathBuf,
    data_dir: PathBuf,
    config: IndexConfig,
    registry: ParserRegistry,
    graph: RwLock<Arc<IndexGraph>>,
    scan_lock: Mutex<()>,
}

impl ProjectIndex {
    /// Open the index for `root`, loading the persisted snapshot if it is valid.
    pub fn open(root: &Path, data_dir: &Path, config: IndexConfig) -> WardenResult<Self> {
        Self::with_registry(root, data_dir, config, ParserRegistry::with_defaults())
    }

    pub fn with_registry(
        root: &Path,
        data_dir: &Path,
        config: IndexConfig,
        registry: ParserRegistry,
    ) -> WardenResult<Self> {
        let root = root.canonicalize()?;
        std::fs::create_dir_all(data_dir)?;
        let data_dir = data_dir.canonicalize()?;

        let graph = load_or_empty(&data_dir);
        tracing::debug!(
            root = %root.display(),
            files = graph.file_count(),
            generation = graph.generation(),
            "project index opened"
        );

        Ok(Self {
            root,
            data_dir,
            config,
            registry,
            graph: RwLock::new(Arc::new(graph)),
            scan_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Immutable view of the current graph.
    pub fn snapshot(&self) -> Arc<IndexGraph> {
        Arc::clone(&self.graph.read())
    }

    /// Bring the index up to date with the working tree.
    pub fn scan(&self, cancel: &CancelToken) -> WardenResult<ScanResult> {
        let started = Instant::now();
        let deadline = started + self.config.scan_timeout();

        let _in_process = self
            .scan_lock
            .try_lock_until(deadline)
            .ok_or_else(|| WardenError::timeout("scan", self.root.display().to_string()))?;
        let _on_disk = ScanLock::acquire(&self.data_dir, deadline)?;

        // Another process may have scanned while we waited.
        let base = load_or_empty(&self.data_dir);

        let walked = FileScanner::new(&self.root, &self.data_dir)
            .exclude(&self.config.exclude)
            .max_file_bytes(self.config.max_file_bytes)
            .scan()?;

        let outcomes = self.process_files(&base, &walked, cancel, deadline)?;
        if cancel.is_cancelled() {
            return Err(WardenError::Cancelled);
        }

        let seen: BTreeSet<&str> = walked.iter().map(|f| f.relative.as_str()).collect();
        let removed_paths: Vec<String> = base
            .files()
            .filter(|f| !seen.contains(f.path.as_str()))
            .map(|f| f.path.clone())
            .collect();

        let mut updates = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                FileOutcome::Unchanged => {}
                FileOutcome::Changed(update, diagnostic) => {
                    errors.extend(diagnostic);
                    updates.push(update);
                }
                FileOutcome::Unreadable(diagnostic) => errors.push(diagnostic),
            }
        }

        if updates.is_empty() && removed_paths.is_empty() {
            let files = base.file_count();
            let generation = base.generation();
            *self.graph.write() = Arc::new(base);
            tracing::info!(files, generation, "scan found no changes");
            return Ok(ScanResult {
                errors,
                generation,
                files,
                ..ScanResult::default()
            });
        }

        let mut next = base;
        let now = Utc::now();
        let generation = next.begin_generation(now);
        let mut result = ScanResult {
            generation,
            errors,
            ..ScanResult::default()
        };
        for update in updates {
            let path = update.path.clone();
            match next.apply(update, now) {
                ChangeKind::Added => result.added += 1,
                ChangeKind::Modified => result.modified += 1,
            }
            result.changed.push(path);
        }
        for path in &removed_paths {
            if next.remove(path) {
                result.removed += 1;
            }
        }
        next.relink();
        result.changed.sort();
        result.removed_paths = removed_paths;
        result.files = next.file_count();

        snapshot::save(&self.data_dir, &next)?;
        *self.graph.write() = Arc::new(next);

        tracing::info!(
            added = result.added,
            modified = result.modified,
            removed = result.removed,
            generation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scan complete"
        );
        Ok(result)
    }

    fn process_files(
        &self,
        base: &IndexGraph,
        walked: &[WalkedFile],
        cancel: &CancelToken,
        deadline: Instant,
    ) -> WardenResult<Vec<FileOutcome>> {
        let unit = |file: &WalkedFile| -> WardenResult<FileOutcome> {
            if cancel.is_cancelled() {
                return Err(WardenError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(WardenError::timeout("scan", file.relative.clone()));
            }
            Ok(self.process_file(base, file))
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build();
        match pool {
            Ok(pool) => pool.install(|| walked.par_iter().map(unit).collect()),
            Err(err) => {
                tracing::warn!(error = %err, "thread pool unavailable, scanning sequentially");
                walked.iter().map(unit).collect()
            }
        }
    }

    fn process_file(&self, base: &IndexGraph, file: &WalkedFile) -> FileOutcome {
        let bytes = match std::fs::read(&file.absolute) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!(path = %file.relative, error = %err, "file unreadable");
                return FileOutcome::Unreadable(ScanDiagnostic {
                    path: file.relative.clone(),
                    message: err.to_string(),
                });
            }
        };

        let content_hash = hex_digest(&bytes);
        if base
            .file_by_path(&file.relative)
            .is_some_and(|existing| existing.content_hash == content_hash)
        {
            return FileOutcome::Unchanged;
        }

        let parser = self.registry.resolve(Path::new(&file.relative));
        let size_bytes = bytes.len() as u64;
        match String::from_utf8(bytes) {
            Ok(source) => FileOutcome::Changed(
                FileUpdate {
                    path: file.relative.clone(),
                    content_hash,
                    language: parser.language().to_string(),
                    size_bytes,
                    parsed: parser.parse(&source),
                    parse_error: None,
                },
                None,
            ),
            Err(err) => {
                let parse_error = WardenError::Parse {
                    path: file.relative.clone(),
                    message: format!("not valid UTF-8: {}", err.utf8_error()),
                };
                tracing::debug!(error = %parse_error, "recording empty record");
                FileOutcome::Changed(
                    FileUpdate {
                        path: file.relative.clone(),
                        content_hash,
                        language: parser.language().to_string(),
                        size_bytes,
                        parsed: Default::default(),
                        parse_error: Some(parse_error.to_string()),
                    },
                    Some(ScanDiagnostic {
                        path: file.relative.clone(),
                        message: parse_error.to_string(),
                    }),
                )
            }
        }
    }

    /// Map user input (absolute, `./`-prefixed, or relative) to an indexed path.
    pub fn normalize_path(&self, input: &str) -> String {
        let path = Path::new(input);
        let relative = if path.is_absolute() {
            let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            match canonical.strip_prefix(&self.root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => return input.to_string(),
            }
        } else {
            path.to_path_buf()
        };
        scanner::normalize_relative(&relative)
    }

    pub fn impact(&self, path: &str, depth: Option<usize>) -> WardenResult<ImpactReport> {
        let graph = self.snapshot();
        let path = self.normalize_path(path);
        impact::impact(&graph, &path, depth.unwrap_or(self.config.impact_depth))
    }

    pub fn search(&self, query: &str) -> IndexSearch {
        IndexSearch::new(self.snapshot(), query)
    }

    /// Marker comments across the index, ordered by path then line.
    pub fn todos(&self) -> Vec<TodoItem> {
        let graph = self.snapshot();
        graph
            .files_by_path()
            .flat_map(|file| {
                file.markers.iter().map(move |m| TodoItem {
                    path: file.path.clone(),
                    line: m.line,
                    tag: m.tag.clone(),
                    text: m.text.clone(),
                })
            })
            .collect()
    }
}

fn load_or_empty(data_dir: &Path) -> IndexGraph {
    match snapshot::load(data_dir) {
        Ok(graph) => graph,
        Err(SnapshotProblem::Missing) => IndexGraph::default(),
        Err(SnapshotProblem::Corrupt(reason)) => {
            tracing::warn!(reason = %reason, "index snapshot unusable, rebuilding from scratch");
            IndexGraph::default()
        }
    }
}

pub fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
