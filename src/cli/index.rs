//! CLI index commands: `scan`, `search`, `impact`, `todos`.

use anyhow::Result;

use warden::index::search::SearchHit;
use warden::index::CancelToken;

use super::{scan_with_spinner, Workspace};

pub fn scan(ws: &Workspace, cancel: &CancelToken) -> Result<()> {
    let index = ws.index()?;
    let result = scan_with_spinner(&index, cancel)?;
    ws.emit(&result, |r| {
        if r.is_unchanged() {
            println!("No changes ({} files, generation {}).", r.files, r.generation);
        } else {
            println!(
                "Indexed generation {}: {} added, {} modified, {} removed ({} files).",
                r.generation, r.added, r.modified, r.removed, r.files
            );
        }
        for diag in &r.errors {
            println!("  skipped {}: {}", diag.path, diag.message);
        }
    })
}

pub fn search(ws: &Workspace, query: &str, limit: usize, cancel: &CancelToken) -> Result<()> {
    let (index, _) = ws.refreshed_index(cancel)?;
    let search = index.search(query);
    let hits: Vec<SearchHit> = search.iter().take(limit).cloned().collect();
    ws.emit(&hits, |hits| {
        if hits.is_empty() {
            println!("No matches for \"{query}\".");
            return;
        }
        for hit in hits {
            match &hit.symbol {
                Some(symbol) => println!(
                    "  {:.2}  {}:{}  {} {}",
                    hit.score,
                    hit.path,
                    hit.line,
                    hit.kind.unwrap_or("symbol"),
                    symbol
                ),
                None => println!("  {:.2}  {}", hit.score, hit.path),
            }
        }
    })
}

pub fn impact(ws: &Workspace, path: &str, depth: Option<usize>, cancel: &CancelToken) -> Result<()> {
    let (index, _) = ws.refreshed_index(cancel)?;
    let report = index.impact(path, depth)?;
    ws.emit(&report, |r| {
        if r.affected.is_empty() {
            println!("Nothing depends on {}.", r.subject);
            return;
        }
        println!(
            "{} file(s) affected by {} (depth <= {}):",
            r.affected.len(),
            r.subject,
            r.max_depth
        );
        for entry in r.direct.iter().chain(r.transitive.iter()) {
            println!("  [{}] {}  (via {})", entry.depth, entry.path, entry.via);
        }
        if r.truncated {
            println!("  ... more beyond depth {}", r.max_depth);
        }
    })
}

pub fn todos(ws: &Workspace, cancel: &CancelToken) -> Result<()> {
    let (index, _) = ws.refreshed_index(cancel)?;
    let items = index.todos();
    ws.emit(&items, |items| {
        if items.is_empty() {
            println!("No TODO/FIXME markers.");
            return;
        }
        for item in items {
            println!("  {}:{}  {} {}", item.path, item.line, item.tag, item.text);
        }
        println!("{} marker(s).", items.len());
    })
}
