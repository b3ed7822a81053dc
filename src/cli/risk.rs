//! CLI risk commands: `predict-bugs`, `security`, `review`, `risk-score`.

use anyhow::{Context, Result};

use warden::error::WardenError;
use warden::index::parser::ParserRegistry;
use warden::index::{CancelToken, ProjectIndex};
use warden::risk::review::review as review_source;
use warden::risk::{AssessmentKind, RiskAssessment, RiskPredictor, RiskScorer};

use super::Workspace;

fn predictor(ws: &Workspace, index: &ProjectIndex) -> Result<RiskPredictor> {
    Ok(RiskPredictor::new(index, ws.memory()?, &ws.config)?)
}

fn print_assessment(a: &RiskAssessment) {
    println!(
        "{}: {} {:.2} ({})",
        a.subject,
        match a.kind {
            AssessmentKind::Bug => "bug risk",
            AssessmentKind::Security => "security",
        },
        a.primary_score(),
        a.level
    );
    for signal in &a.signals {
        println!(
            "  {:<22} raw {:>7.2}  contribution {:.3}",
            signal.name, signal.raw, signal.contribution
        );
    }
}

pub fn predict_bugs(ws: &Workspace, path: &str, cancel: &CancelToken) -> Result<()> {
    let (index, _) = ws.refreshed_index(cancel)?;
    let path = index.normalize_path(path);
    let assessment = predictor(ws, &index)?.predict_bugs(&path)?;
    ws.emit(&assessment, print_assessment)
}

pub fn security(ws: &Workspace, path: &str, cancel: &CancelToken) -> Result<()> {
    let (index, _) = ws.refreshed_index(cancel)?;
    let path = index.normalize_path(path);
    let assessment = predictor(ws, &index)?.security_scan(&path)?;
    ws.emit(&assessment, print_assessment)
}

pub fn review(ws: &Workspace, path: &str, cancel: &CancelToken) -> Result<()> {
    let (index, _) = ws.refreshed_index(cancel)?;
    let path = index.normalize_path(path);
    if index.snapshot().file_by_path(&path).is_none() {
        return Err(WardenError::not_found(path).into());
    }
    let bytes = std::fs::read(index.root().join(&path))
        .with_context(|| format!("failed to read {path}"))?;
    let source = String::from_utf8_lossy(&bytes);

    let predictor = predictor(ws, &index)?;
    let findings = review_source(&path, &source, predictor.rules(), &ParserRegistry::with_defaults());
    ws.emit(&findings, |findings| {
        if findings.is_empty() {
            println!("{path}: no findings.");
            return;
        }
        for f in findings {
            println!("  {}:{}  [{}] {}", f.path, f.line, f.category.as_str(), f.message);
        }
        println!("{} finding(s) (advisory).", findings.len());
    })
}

pub fn risk_score(ws: &Workspace, paths: &[String], cancel: &CancelToken) -> Result<()> {
    let (index, _) = ws.refreshed_index(cancel)?;
    let paths: Vec<String> = paths.iter().map(|p| index.normalize_path(p)).collect();
    let summary = predictor(ws, &index)?.risk_score(&paths);
    ws.emit(&summary, |s| {
        if s.files.is_empty() && s.errors.is_empty() {
            println!("No files to score.");
            return;
        }
        for f in &s.files {
            println!(
                "  {:<40} bug {:.2}  security {:.2} ({})",
                f.path, f.bug_risk, f.security_score, f.level
            );
        }
        println!(
            "max bug risk {:.2}, mean {:.2}, worst security level {}",
            s.max_bug_risk, s.mean_bug_risk, s.max_level
        );
        for err in &s.errors {
            println!("  not scored: {err}");
        }
    })
}
