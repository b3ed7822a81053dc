//! One-shot context bundle for an agent starting work.
//!
//! [`autocontext`] refreshes the index, picks the files that changed most
//! recently, pulls memories and recorded assessments related to them, and
//! trims everything to a token budget. Its only memory write is a single
//! audit observation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::config::ContextConfig;
use crate::error::WardenResult;
use crate::gate::{self, GATE_NAMESPACE};
use crate::index::{CancelToken, ProjectIndex, ScanResult};
use crate::memory::search::RecallOptions;
use crate::memory::types::{Observation, ScoredEntry};
use crate::memory::MemoryStore;
use crate::risk::RiskAssessment;

pub const AUTOCONTEXT_NAMESPACE: &str = "autocontext";

/// Gate decisions consulted when looking up prior assessments.
const DECISION_LOOKBACK: usize = 50;

/// Rough token count: about 3.5 bytes per token.
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() as f64 / 3.5).ceil() as usize
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentFile {
    pub path: String,
    pub language: String,
    pub symbols: usize,
    pub last_changed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hotspot {
    pub path: String,
    pub fan_in: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextBundle {
    pub generated_at: DateTime<Utc>,
    pub scan: ScanResult,
    pub recent_files: Vec<RecentFile>,
    /// Files the recent files depend on.
    pub related_files: Vec<String>,
    pub memories: Vec<ScoredEntry>,
    pub assessments: Vec<RiskAssessment>,
    pub hotspots: Vec<Hotspot>,
    pub open_markers: usize,
    pub token_estimate: usize,
    /// Memories or assessments were dropped to fit the budget.
    pub truncated: bool,
    pub audit_key: String,
}

pub fn autocontext(
    index: &ProjectIndex,
    memory: &MemoryStore,
    config: &ContextConfig,
    cancel: &CancelToken,
) -> WardenResult<ContextBundle> {
    let scan = index.scan(cancel)?;
    let graph = index.snapshot();

    let recent_paths: Vec<String> = if scan.changed.is_empty() {
        let mut files: Vec<_> = graph.files().filter(|f| f.last_changed() > 0).collect();
        files.sort_by(|a, b| {
            b.last_changed()
                .cmp(&a.last_changed())
                .then_with(|| a.path.cmp(&b.path))
        });
        files.iter().take(config.seed_files).map(|f| f.path.clone()).collect()
    } else {
        scan.changed.iter().take(config.seed_files).cloned().collect()
    };

    let recent_files: Vec<RecentFile> = recent_paths
        .iter()
        .filter_map(|p| graph.file_by_path(p))
        .map(|f| RecentFile {
            path: f.path.clone(),
            language: f.language.clone(),
            symbols: f.declares.len(),
            last_changed: f.last_changed(),
        })
        .collect();

    let recent_set: BTreeSet<&str> = recent_paths.iter().map(String::as_str).collect();
    let related_files: Vec<String> = recent_paths
        .iter()
        .filter_map(|p| graph.file_by_path(p))
        .flat_map(|f| graph.dependencies(f))
        .filter_map(|fid| graph.file(fid))
        .map(|f| f.path.clone())
        .filter(|p| !recent_set.contains(p.as_str()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    // bounded recall per seed path, merged by key
    let options = RecallOptions::untracked(config.max_memories)
        .excluding([GATE_NAMESPACE, AUTOCONTEXT_NAMESPACE]);
    let mut merged: BTreeMap<String, ScoredEntry> = BTreeMap::new();
    for path in &recent_paths {
        for hit in memory.recall_with(path, &options)? {
            match merged.get(&hit.entry.key) {
                Some(existing) if existing.score >= hit.score => {}
                _ => {
                    merged.insert(hit.entry.key.clone(), hit);
                }
            }
        }
    }
    let mut memories: Vec<ScoredEntry> = merged.into_values().collect();
    memories.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.entry.updated_at.cmp(&a.entry.updated_at))
    });
    memories.truncate(config.max_memories);

    // newest recorded assessments for each recent file
    let decisions = gate::recent_decisions(memory, DECISION_LOOKBACK)?;
    let mut assessments = Vec::new();
    for path in &recent_paths {
        if let Some(decision) = decisions
            .iter()
            .find(|d| d.assessments.iter().any(|a| &a.subject == path))
        {
            assessments.extend(
                decision
                    .assessments
                    .iter()
                    .filter(|a| &a.subject == path)
                    .cloned(),
            );
        }
    }

    let mut hotspots: Vec<Hotspot> = graph
        .files()
        .map(|f| Hotspot {
            path: f.path.clone(),
            fan_in: graph.referencers(f).len(),
        })
        .filter(|h| h.fan_in > 0)
        .collect();
    hotspots.sort_by(|a, b| b.fan_in.cmp(&a.fan_in).then_with(|| a.path.cmp(&b.path)));
    hotspots.truncate(config.hotspots);

    let open_markers = graph.files().map(|f| f.markers.len()).sum();

    // budget: file lists are always kept, then memories, then assessments
    let mut used: usize = recent_files
        .iter()
        .map(|f| estimate_tokens(&f.path))
        .chain(related_files.iter().map(|p| estimate_tokens(p)))
        .chain(hotspots.iter().map(|h| estimate_tokens(&h.path)))
        .sum();
    let mut truncated = false;

    let mut kept_memories = Vec::new();
    for hit in memories {
        let cost = estimate_tokens(&hit.entry.key) + estimate_tokens(&hit.entry.value);
        if used + cost > config.token_budget {
            truncated = true;
            continue;
        }
        used += cost;
        kept_memories.push(hit);
    }

    let mut kept_assessments = Vec::new();
    for assessment in assessments {
        let cost = serde_json::to_string(&assessment)
            .map(|s| estimate_tokens(&s))
            .unwrap_or(0);
        if used + cost > config.token_budget {
            truncated = true;
            continue;
        }
        used += cost;
        kept_assessments.push(assessment);
    }

    let generated_at = Utc::now();
    let audit = Observation::new(
        AUTOCONTEXT_NAMESPACE,
        format!(
            "autocontext at {} over {} file(s), generation {}",
            generated_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            recent_files.len(),
            scan.generation
        ),
    );
    let audit_key = memory.learn(&audit)?.key;

    tracing::info!(
        recent = recent_files.len(),
        memories = kept_memories.len(),
        assessments = kept_assessments.len(),
        tokens = used,
        truncated,
        "context assembled"
    );

    Ok(ContextBundle {
        generated_at,
        scan,
        recent_files,
        related_files,
        memories: kept_memories,
        assessments: kept_assessments,
        hotspots,
        open_markers,
        token_estimate: used,
        truncated,
        audit_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefg"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(35)), 10);
    }
}
