//! Commit gate.
//!
//! One invocation moves through two phases. Evaluating scores every staged
//! file (in parallel; the verdict does not depend on order). Decided applies
//! the thresholds and records the decision in the memory store, allowed
//! commits included, so later bug-risk predictions can learn from it.
//!
//! A file whose scoring fails is let through and cited in the reason.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::GateConfig;
use crate::error::WardenResult;
use crate::memory::types::{MemoryEntry, Observation};
use crate::memory::MemoryStore;
use crate::risk::{AssessmentKind, RiskAssessment, RiskScorer};

/// Memory namespace that gate decisions are learned under.
pub const GATE_NAMESPACE: &str = "gate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Block,
}

impl Verdict {
    /// Process exit code a commit hook keys on.
    pub fn exit_code(&self) -> u8 {
        match self {
            Verdict::Allow => 0,
            Verdict::Block => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub id: String,
    /// Staged files, sorted and deduplicated.
    pub subject: Vec<String>,
    pub verdict: Verdict,
    /// Assessments that crossed a threshold.
    pub triggering: Vec<RiskAssessment>,
    pub assessments: Vec<RiskAssessment>,
    pub errors: Vec<FileError>,
    pub reason: String,
    pub decided_at: DateTime<Utc>,
}

pub struct Gate<'a> {
    scorer: &'a dyn RiskScorer,
    config: &'a GateConfig,
}

impl<'a> Gate<'a> {
    pub fn new(scorer: &'a dyn RiskScorer, config: &'a GateConfig) -> Self {
        Self { scorer, config }
    }

    /// Score `files` and decide. Pure: nothing is written.
    pub fn evaluate(&self, files: &[String]) -> GateDecision {
        let mut subject: Vec<String> = files.iter().map(|f| f.trim().to_string()).collect();
        subject.retain(|f| !f.is_empty());
        subject.sort();
        subject.dedup();

        let scored: Vec<(String, WardenResult<(RiskAssessment, RiskAssessment)>)> = subject
            .par_iter()
            .map(|path| {
                let result = self
                    .scorer
                    .predict_bugs(path)
                    .and_then(|bug| self.scorer.security_scan(path).map(|sec| (bug, sec)));
                (path.clone(), result)
            })
            .collect();

        let mut assessments = Vec::new();
        let mut errors = Vec::new();
        for (path, result) in scored {
            match result {
                Ok((bug, sec)) => {
                    assessments.push(bug);
                    assessments.push(sec);
                }
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "scoring failed, letting file through");
                    errors.push(FileError {
                        path,
                        message: err.to_string(),
                    });
                }
            }
        }

        let triggering: Vec<RiskAssessment> = assessments
            .iter()
            .filter(|a| self.triggers(a))
            .cloned()
            .collect();
        let verdict = if triggering.is_empty() {
            Verdict::Allow
        } else {
            Verdict::Block
        };
        let reason = self.reason(verdict, &subject, &triggering, &errors);

        GateDecision {
            id: uuid::Uuid::now_v7().to_string(),
            subject,
            verdict,
            triggering,
            assessments,
            errors,
            reason,
            decided_at: Utc::now(),
        }
    }

    /// Evaluate, then record the decision through `learn`.
    pub fn run(&self, files: &[String], memory: &MemoryStore) -> WardenResult<GateDecision> {
        let decision = self.evaluate(files);
        let entry = record(memory, &decision)?;
        tracing::info!(
            verdict = ?decision.verdict,
            files = decision.subject.len(),
            key = %entry.key,
            "gate decision recorded"
        );
        Ok(decision)
    }

    fn triggers(&self, assessment: &RiskAssessment) -> bool {
        match assessment.kind {
            AssessmentKind::Security => assessment.level >= self.config.severity_threshold,
            AssessmentKind::Bug => assessment.bug_risk >= self.config.bug_threshold,
        }
    }

    fn reason(
        &self,
        verdict: Verdict,
        subject: &[String],
        triggering: &[RiskAssessment],
        errors: &[FileError],
    ) -> String {
        let mut reason = match verdict {
            Verdict::Block => {
                let causes: Vec<String> = triggering
                    .iter()
                    .map(|a| match a.kind {
                        AssessmentKind::Security => {
                            let rules: Vec<&str> = a.signals.iter().map(|s| s.name.as_str()).collect();
                            format!(
                                "{}: security {} ({:.2}; {})",
                                a.subject,
                                a.level,
                                a.security_score,
                                rules.join(", ")
                            )
                        }
                        AssessmentKind::Bug => format!(
                            "{}: bug risk {:.2} >= {:.2}",
                            a.subject, a.bug_risk, self.config.bug_threshold
                        ),
                    })
                    .collect();
                format!("blocked: {}", causes.join("; "))
            }
            Verdict::Allow if subject.is_empty() => "allowed: no staged files".to_string(),
            Verdict::Allow => format!("allowed: {} file(s) below thresholds", subject.len()),
        };
        if !errors.is_empty() {
            let failed: Vec<String> = errors
                .iter()
                .map(|e| format!("{} ({})", e.path, e.message))
                .collect();
            reason.push_str(&format!("; not scored, allowed through: {}", failed.join(", ")));
        }
        reason
    }
}

/// Store a decision under the gate namespace.
pub fn record(memory: &MemoryStore, decision: &GateDecision) -> WardenResult<MemoryEntry> {
    let text = serde_json::to_string(decision)?;
    memory.learn(&Observation::new(GATE_NAMESPACE, text))
}

/// Recorded decisions, newest first.
pub fn recent_decisions(memory: &MemoryStore, limit: usize) -> WardenResult<Vec<GateDecision>> {
    let entries = memory.recent_in_namespace(GATE_NAMESPACE, limit)?;
    Ok(entries
        .iter()
        .filter_map(|e| serde_json::from_str(&e.value).ok())
        .collect())
}

/// Shell script for `.git/hooks/pre-commit`. The gate reads the staged set
/// itself. Only exit code 2 blocks; any other failure lets the commit through.
pub fn hook_script(program: &str) -> String {
    format!(
        r#"#!/bin/sh
# installed by warden setup-hook
"{program}" gate
status=$?
if [ "$status" -eq 2 ]; then
    echo "warden: commit blocked (see reason above)" >&2
    exit 1
fi
if [ "$status" -ne 0 ]; then
    echo "warden: gate unavailable (exit $status), allowing commit" >&2
fi
exit 0
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WardenError;
    use crate::risk::{SeverityLevel, Signal};

    struct FixedScorer;

    fn assessment(path: &str, kind: AssessmentKind, score: f64) -> RiskAssessment {
        RiskAssessment {
            subject: path.to_string(),
            kind,
            bug_risk: if kind == AssessmentKind::Bug { score } else { 0.0 },
            security_score: if kind == AssessmentKind::Security { score } else { 0.0 },
            level: SeverityLevel::from_score(score),
            signals: vec![Signal {
                name: "fixed".into(),
                raw: score,
                contribution: score,
            }],
            as_of: None,
        }
    }

    impl RiskScorer for FixedScorer {
        fn predict_bugs(&self, path: &str) -> WardenResult<RiskAssessment> {
            match path {
                "missing.rs" => Err(WardenError::not_found(path)),
                "buggy.rs" => Ok(assessment(path, AssessmentKind::Bug, 0.9)),
                _ => Ok(assessment(path, AssessmentKind::Bug, 0.1)),
            }
        }

        fn security_scan(&self, path: &str) -> WardenResult<RiskAssessment> {
            match path {
                "a.txt" => Ok(assessment(path, AssessmentKind::Security, 0.95)),
                "high.rs" => Ok(assessment(path, AssessmentKind::Security, 0.7)),
                _ => Ok(assessment(path, AssessmentKind::Security, 0.0)),
            }
        }
    }

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn critical_security_blocks_and_cites_file() {
        let config = GateConfig::default();
        let decision = Gate::new(&FixedScorer, &config).evaluate(&files(&["b.txt", "a.txt"]));
        assert_eq!(decision.verdict, Verdict::Block);
        assert_eq!(decision.verdict.exit_code(), 2);
        assert!(decision.reason.contains("a.txt"));
        assert!(!decision.reason.contains("b.txt"));
        assert_eq!(decision.triggering.len(), 1);
        assert_eq!(decision.subject, files(&["a.txt", "b.txt"]));
    }

    #[test]
    fn high_is_below_default_threshold() {
        let config = GateConfig::default();
        let decision = Gate::new(&FixedScorer, &config).evaluate(&files(&["high.rs"]));
        assert_eq!(decision.verdict, Verdict::Allow);

        let strict = GateConfig {
            severity_threshold: SeverityLevel::High,
            ..GateConfig::default()
        };
        let decision = Gate::new(&FixedScorer, &strict).evaluate(&files(&["high.rs"]));
        assert_eq!(decision.verdict, Verdict::Block);
    }

    #[test]
    fn bug_threshold_blocks() {
        let config = GateConfig::default();
        let decision = Gate::new(&FixedScorer, &config).evaluate(&files(&["buggy.rs"]));
        assert_eq!(decision.verdict, Verdict::Block);
        assert!(decision.reason.contains("bug risk 0.90"));
    }

    #[test]
    fn scorer_errors_fail_open() {
        let config = GateConfig::default();
        let decision = Gate::new(&FixedScorer, &config).evaluate(&files(&["missing.rs", "ok.rs"]));
        assert_eq!(decision.verdict, Verdict::Allow);
        assert_eq!(decision.errors.len(), 1);
        assert!(decision.reason.contains("missing.rs"));
    }

    #[test]
    fn empty_staging_allows() {
        let config = GateConfig::default();
        let decision = Gate::new(&FixedScorer, &config).evaluate(&[]);
        assert_eq!(decision.verdict, Verdict::Allow);
        assert_eq!(decision.reason, "allowed: no staged files");
    }

    #[test]
    fn hook_only_blocks_on_exit_two() {
        let script = hook_script("/usr/local/bin/warden");
        assert!(script.starts_with("#!/bin/sh"));
        assert!(script.contains("\"$status\" -eq 2"));
        assert!(script.contains("\"/usr/local/bin/warden\" gate\n"));
        assert!(!script.contains("$files"));
    }
}
