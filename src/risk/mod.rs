//! Bug-risk and security scoring.
//!
//! [`RiskScorer`] is the seam the gate depends on; [`RiskPredictor`] is the
//! heuristic implementation built from index structure, scan history, past
//! gate decisions, and a regex rule set. Scoring never writes to the store.

pub mod predict;
pub mod review;
pub mod security;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::WardenConfig;
use crate::error::{WardenError, WardenResult};
use crate::index::graph::IndexGraph;
use crate::index::ProjectIndex;
use crate::memory::MemoryStore;
use security::RuleSet;

/// Discrete severity derived from a score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    /// `<0.2` none, `<0.4` low, `<0.6` medium, `<0.85` high, else critical.
    pub fn from_score(score: f64) -> Self {
        if score < 0.2 {
            SeverityLevel::None
        } else if score < 0.4 {
            SeverityLevel::Low
        } else if score < 0.6 {
            SeverityLevel::Medium
        } else if score < 0.85 {
            SeverityLevel::High
        } else {
            SeverityLevel::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::None => "none",
            SeverityLevel::Low => "low",
            SeverityLevel::Medium => "medium",
            SeverityLevel::High => "high",
            SeverityLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SeverityLevel {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(SeverityLevel::None),
            "low" => Ok(SeverityLevel::Low),
            "medium" => Ok(SeverityLevel::Medium),
            "high" => Ok(SeverityLevel::High),
            "critical" => Ok(SeverityLevel::Critical),
            other => Err(WardenError::InvalidInput(format!("unknown severity level: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentKind {
    Bug,
    Security,
}

/// One explainability term: the normalized signal and its share of the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub raw: f64,
    pub contribution: f64,
}

/// Immutable scoring result. A later assessment of the same subject supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub subject: String,
    pub kind: AssessmentKind,
    pub bug_risk: f64,
    pub security_score: f64,
    /// Level of this assessment's primary score.
    pub level: SeverityLevel,
    pub signals: Vec<Signal>,
    /// Scan time of the index state the score was computed from.
    pub as_of: Option<DateTime<Utc>>,
}

impl RiskAssessment {
    pub fn primary_score(&self) -> f64 {
        match self.kind {
            AssessmentKind::Bug => self.bug_risk,
            AssessmentKind::Security => self.security_score,
        }
    }
}

pub trait RiskScorer: Send + Sync {
    fn predict_bugs(&self, path: &str) -> WardenResult<RiskAssessment>;
    fn security_scan(&self, path: &str) -> WardenResult<RiskAssessment>;
}

/// Heuristic scorer over one index snapshot.
pub struct RiskPredictor {
    root: PathBuf,
    graph: Arc<IndexGraph>,
    memory: MemoryStore,
    config: WardenConfig,
    rules: RuleSet,
}

impl RiskPredictor {
    pub fn new(index: &ProjectIndex, memory: MemoryStore, config: &WardenConfig) -> WardenResult<Self> {
        Ok(Self {
            root: index.root().to_path_buf(),
            graph: index.snapshot(),
            memory,
            rules: RuleSet::from_config(&config.security)?,
            config: config.clone(),
        })
    }

    pub fn graph(&self) -> &IndexGraph {
        &self.graph
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn read_source(&self, path: &str) -> WardenResult<String> {
        let bytes = std::fs::read(self.root.join(path))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn require_indexed(&self, path: &str) -> WardenResult<()> {
        if self.graph.file_by_path(path).is_none() {
            return Err(WardenError::not_found(path));
        }
        Ok(())
    }

    /// Score several files. Empty `paths` means the files changed in the
    /// latest scan generation.
    pub fn risk_score(&self, paths: &[String]) -> RiskSummary {
        let targets: Vec<String> = if paths.is_empty() {
            let generation = self.graph.generation();
            self.graph
                .files()
                .filter(|f| generation > 0 && f.last_changed() == generation)
                .map(|f| f.path.clone())
                .collect()
        } else {
            paths.to_vec()
        };

        let mut files = Vec::new();
        let mut errors = Vec::new();
        for path in targets {
            let scored = self
                .predict_bugs(&path)
                .and_then(|bug| self.security_scan(&path).map(|sec| (bug, sec)));
            match scored {
                Ok((bug, sec)) => files.push(FileRisk {
                    path,
                    bug_risk: bug.bug_risk,
                    security_score: sec.security_score,
                    level: sec.level,
                }),
                Err(err) => errors.push(format!("{path}: {err}")),
            }
        }
        RiskSummary::from_files(files, errors)
    }
}

impl RiskScorer for RiskPredictor {
    fn predict_bugs(&self, path: &str) -> WardenResult<RiskAssessment> {
        self.require_indexed(path)?;
        predict::predict_bugs(
            &self.graph,
            &self.memory,
            &self.config.risk,
            self.config.index.churn_window,
            path,
        )
    }

    fn security_scan(&self, path: &str) -> WardenResult<RiskAssessment> {
        self.require_indexed(path)?;
        let source = self.read_source(path)?;
        Ok(self
            .rules
            .assess(path, &source, self.graph.last_scan_at()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileRisk {
    pub path: String,
    pub bug_risk: f64,
    pub security_score: f64,
    pub level: SeverityLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskSummary {
    pub files: Vec<FileRisk>,
    pub max_bug_risk: f64,
    pub mean_bug_risk: f64,
    pub max_security_score: f64,
    pub max_level: SeverityLevel,
    pub errors: Vec<String>,
}

impl RiskSummary {
    fn from_files(files: Vec<FileRisk>, errors: Vec<String>) -> Self {
        let max_bug_risk = files.iter().map(|f| f.bug_risk).fold(0.0, f64::max);
        let mean_bug_risk = if files.is_empty() {
            0.0
        } else {
            files.iter().map(|f| f.bug_risk).sum::<f64>() / files.len() as f64
        };
        let max_security_score = files.iter().map(|f| f.security_score).fold(0.0, f64::max);
        let max_level = files.iter().map(|f| f.level).max().unwrap_or_default();
        Self {
            files,
            max_bug_risk,
            mean_bug_risk,
            max_security_score,
            max_level,
            errors,
        }
    }
}
