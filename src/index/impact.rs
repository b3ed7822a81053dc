//! Reverse-dependency traversal.

use std::collections::BTreeSet;

use serde::Serialize;

use super::graph::{FileId, IndexGraph};
use crate::error::{WardenError, WardenResult};

pub const MAX_IMPACT_DEPTH: usize = 6;

pub fn clamp_depth(depth: usize) -> usize {
    depth.clamp(1, MAX_IMPACT_DEPTH)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactEntry {
    pub path: String,
    pub depth: usize,
    /// The file one level closer to the subject through which this one was reached.
    pub via: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpactReport {
    pub subject: String,
    pub max_depth: usize,
    pub direct: Vec<ImpactEntry>,
    pub transitive: Vec<ImpactEntry>,
    /// Breadth-first order, ties broken by path.
    pub affected: Vec<String>,
    /// `true` when the depth cap stopped expansion with referencers left unvisited.
    pub truncated: bool,
}

/// BFS over referencer edges starting at `path`.
pub fn impact(graph: &IndexGraph, path: &str, depth: usize) -> WardenResult<ImpactReport> {
    let subject = graph
        .file_by_path(path)
        .ok_or_else(|| WardenError::not_found(path))?;
    let max_depth = clamp_depth(depth);

    let mut visited: BTreeSet<FileId> = BTreeSet::from([subject.id]);
    let mut frontier: Vec<FileId> = vec![subject.id];
    let mut direct = Vec::new();
    let mut transitive = Vec::new();
    let mut truncated = false;

    for level in 1..=max_depth + 1 {
        // (path, id, via) for everything first reached at this level
        let mut next: Vec<(String, FileId, String)> = Vec::new();
        for fid in &frontier {
            let Some(current) = graph.file(*fid) else {
                continue;
            };
            for referencer in graph.referencers(current) {
                if visited.contains(&referencer) {
                    continue;
                }
                if let Some(record) = graph.file(referencer) {
                    if !next.iter().any(|(_, id, _)| *id == referencer) {
                        next.push((record.path.clone(), referencer, current.path.clone()));
                    }
                }
            }
        }
        if next.is_empty() {
            break;
        }
        if level > max_depth {
            truncated = true;
            break;
        }
        next.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.2.cmp(&b.2)));

        frontier.clear();
        for (path, fid, via) in next {
            visited.insert(fid);
            frontier.push(fid);
            let entry = ImpactEntry {
                path,
                depth: level,
                via,
            };
            if level == 1 {
                direct.push(entry);
            } else {
                transitive.push(entry);
            }
        }
    }

    let affected = direct
        .iter()
        .chain(transitive.iter())
        .map(|e| e.path.clone())
        .collect();

    Ok(ImpactReport {
        subject: subject.path.clone(),
        max_depth,
        direct,
        transitive,
        affected,
        truncated,
    })
}
