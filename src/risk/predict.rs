//! Bug-likelihood signals.
//!
//! Every signal is normalized to `[0, 1]` by its configured saturation point
//! and weighted; the score is the weighted mean. Inputs are the index snapshot
//! and recorded gate decisions only, so the same state always yields the same
//! score.

use crate::config::RiskConfig;
use crate::error::{WardenError, WardenResult};
use crate::gate::{GateDecision, Verdict, GATE_NAMESPACE};
use crate::index::graph::IndexGraph;
use crate::memory::search::RecallOptions;
use crate::memory::MemoryStore;

use super::{AssessmentKind, RiskAssessment, SeverityLevel, Signal};

fn saturate(raw: f64, saturation: f64) -> f64 {
    if saturation <= 0.0 {
        return if raw > 0.0 { 1.0 } else { 0.0 };
    }
    (raw / saturation).clamp(0.0, 1.0)
}

/// Own changes plus half of each direct referencer's changes within the window.
pub fn churn(graph: &IndexGraph, path: &str, window: u64) -> f64 {
    let Some(file) = graph.file_by_path(path) else {
        return 0.0;
    };
    let since = graph.generation().saturating_sub(window);
    let own = file.changes_since(since) as f64;
    let neighbours: f64 = graph
        .referencers(file)
        .into_iter()
        .filter_map(|fid| graph.file(fid))
        .map(|f| f.changes_since(since) as f64)
        .sum();
    own + 0.5 * neighbours
}

/// Mean outcome of the most recent gate decisions that covered `path`:
/// 1.0 when the decision blocked on this file, else the bug risk recorded then.
pub fn history(memory: &MemoryStore, path: &str, window: usize) -> WardenResult<Option<f64>> {
    if window == 0 {
        return Ok(None);
    }
    // decisions store subjects as JSON strings, so match the quoted path
    let options = RecallOptions::untracked(window.saturating_mul(10).max(50))
        .in_namespace(GATE_NAMESPACE)
        .phrase();
    let needle = serde_json::to_string(path)?;
    let hits = memory.recall_with(&needle, &options)?;

    let mut decisions: Vec<GateDecision> = hits
        .into_iter()
        .filter_map(|hit| match serde_json::from_str::<GateDecision>(&hit.entry.value) {
            Ok(decision) => Some(decision),
            Err(err) => {
                tracing::debug!(key = %hit.entry.key, error = %err, "skipping unreadable gate record");
                None
            }
        })
        .filter(|d| d.subject.iter().any(|s| s == path))
        .collect();
    decisions.sort_by(|a, b| {
        b.decided_at
            .cmp(&a.decided_at)
            .then_with(|| b.id.cmp(&a.id))
    });

    let outcomes: Vec<f64> = decisions
        .iter()
        .filter_map(|d| {
            let blocked_here =
                d.verdict == Verdict::Block && d.triggering.iter().any(|a| a.subject == path);
            if blocked_here {
                return Some(1.0);
            }
            d.assessments
                .iter()
                .find(|a| a.subject == path && a.kind == AssessmentKind::Bug)
                .map(|a| a.bug_risk)
        })
        .take(window)
        .collect();

    if outcomes.is_empty() {
        return Ok(None);
    }
    Ok(Some(outcomes.iter().sum::<f64>() / outcomes.len() as f64))
}

pub fn predict_bugs(
    graph: &IndexGraph,
    memory: &MemoryStore,
    config: &RiskConfig,
    churn_window: u64,
    path: &str,
) -> WardenResult<RiskAssessment> {
    let file = graph
        .file_by_path(path)
        .ok_or_else(|| WardenError::not_found(path))?;

    let churn_raw = churn(graph, path, churn_window);
    let symbols_raw = file.declares.len() as f64;
    let fan_in_raw = graph.referencers(file).len() as f64;
    let fan_out_raw = graph.dependencies(file).len() as f64;
    let history_raw = history(memory, path, config.history_window)
        .map_err(|e| WardenError::Internal(format!("history signal for {path}: {e}")))?
        .unwrap_or(0.0);

    let w = &config.weights;
    let terms = [
        ("churn", churn_raw, saturate(churn_raw, config.churn_saturation), w.churn),
        ("symbols", symbols_raw, saturate(symbols_raw, config.symbols_saturation), w.symbols),
        ("fan_in", fan_in_raw, saturate(fan_in_raw, config.fan_in_saturation), w.fan_in),
        ("fan_out", fan_out_raw, saturate(fan_out_raw, config.fan_out_saturation), w.fan_out),
        ("history", history_raw, history_raw.clamp(0.0, 1.0), w.history),
    ];

    let total_weight: f64 = terms.iter().map(|(_, _, _, weight)| weight.max(0.0)).sum();
    let signals: Vec<Signal> = terms
        .iter()
        .map(|(name, raw, normalized, weight)| Signal {
            name: (*name).to_string(),
            raw: *raw,
            contribution: if total_weight > 0.0 {
                weight.max(0.0) * normalized / total_weight
            } else {
                0.0
            },
        })
        .collect();
    let score = signals
        .iter()
        .map(|s| s.contribution)
        .sum::<f64>()
        .clamp(0.0, 1.0);

    tracing::debug!(path, score, churn = churn_raw, fan_in = fan_in_raw, "bug risk computed");
    Ok(RiskAssessment {
        subject: path.to_string(),
        kind: AssessmentKind::Bug,
        bug_risk: score,
        security_score: 0.0,
        level: SeverityLevel::from_score(score),
        signals,
        as_of: graph.last_scan_at(),
    })
}
