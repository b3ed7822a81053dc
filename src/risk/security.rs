//! Regex rule set for risky constructs.
//!
//! Each distinct rule that matches contributes its weight once, combined as
//! `1 - Π(1 - w)`. Contributions are reported as the marginal increase when
//! rules are folded in name order, so they always sum to the score.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use super::{AssessmentKind, RiskAssessment, SeverityLevel, Signal};
use crate::config::SecurityConfig;
use crate::error::{WardenError, WardenResult};

/// Built-in rules: (name, pattern, weight, description).
const DEFAULT_RULES: &[(&str, &str, f64, &str)] = &[
    (
        "aws-access-key",
        r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b",
        1.0,
        "cloud access key id committed in source",
    ),
    (
        "eval-exec",
        r"\b(?:eval|exec)\s*\(",
        0.6,
        "dynamic code evaluation",
    ),
    (
        "external-input",
        r"(?:\binput\s*\(|\braw_input\s*\(|\brequest\.(?:args|form|GET|POST)\b|\breq\.(?:query|body|params)\b|std::env::args|\bos\.Args\b|\bsys\.argv\b)",
        0.3,
        "unchecked external input",
    ),
    (
        "hardcoded-credential",
        r#"(?i)\b(?:password|passwd|pwd|secret|api[_-]?key|auth[_-]?token|access[_-]?token)\b\s*[:=]\s*["'][^"'\s]{4,}["']"#,
        0.9,
        "credential-like literal assigned in source",
    ),
    (
        "private-key",
        r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |PGP |ENCRYPTED )?PRIVATE KEY-----",
        1.0,
        "private key material",
    ),
    (
        "shell-injection",
        r"(?:\bos\.system\s*\(|\bsubprocess\.(?:call|run|Popen)\([^)]*shell\s*=\s*True|\bchild_process\.exec\b|Runtime\.getRuntime\(\)\.exec)",
        0.6,
        "command executed through a shell",
    ),
    (
        "sql-concat",
        r#"(?i)["'][^"'\n]*\b(?:select\s.+\sfrom|insert\s+into|update\s+\w+\s+set|delete\s+from)\b[^"'\n]*["']\s*(?:\+|%)"#,
        0.5,
        "SQL built by string concatenation",
    ),
    (
        "tls-verify-disabled",
        r"(?:verify\s*=\s*False|danger_accept_invalid_certs\s*\(\s*true|InsecureSkipVerify\s*:\s*true|rejectUnauthorized\s*:\s*false|CURLOPT_SSL_VERIFYPEER\s*,\s*(?:0|false))",
        0.7,
        "TLS certificate verification disabled",
    ),
    (
        "unsafe-block",
        r"\bunsafe\s*\{",
        0.2,
        "unsafe block",
    ),
    (
        "unsafe-deserialize",
        r"(?:\bpickle\.loads?\(|\byaml\.load\(|\bmarshal\.loads?\(|new\s+ObjectInputStream\()",
        0.5,
        "deserialization of untrusted data",
    ),
    (
        "weak-hash",
        r#"(?:\bhashlib\.(?:md5|sha1)\b|\b(?:md5|sha1)\s*\(|MessageDigest\.getInstance\(\s*"(?:MD5|SHA-?1)")"#,
        0.3,
        "weak hash algorithm",
    ),
];

#[derive(Debug, Clone)]
pub struct SecurityRule {
    pub name: String,
    pub weight: f64,
    pub description: String,
    regex: Regex,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleMatch {
    pub rule: String,
    pub line: u32,
    pub description: String,
}

/// Compiled rules, kept sorted by name.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<SecurityRule>,
}

impl RuleSet {
    /// Built-in rules minus `disabled`, plus configured extras. An extra rule
    /// with a built-in's name replaces it.
    pub fn from_config(config: &SecurityConfig) -> WardenResult<Self> {
        let mut rules: Vec<SecurityRule> = Vec::new();
        for (name, pattern, weight, description) in DEFAULT_RULES {
            if config.disabled.iter().any(|d| d == name) {
                continue;
            }
            rules.push(compile(name, pattern, *weight, description)?);
        }
        for extra in &config.rules {
            rules.retain(|r| r.name != extra.name);
            rules.push(compile(&extra.name, &extra.pattern, extra.weight, &extra.description)?);
        }
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[SecurityRule] {
        &self.rules
    }

    /// Every (rule, line) hit in `source`.
    pub fn matches(&self, source: &str) -> Vec<RuleMatch> {
        let mut hits = Vec::new();
        for (idx, line) in source.lines().enumerate() {
            for rule in &self.rules {
                if rule.regex.is_match(line) {
                    hits.push(RuleMatch {
                        rule: rule.name.clone(),
                        line: idx as u32 + 1,
                        description: rule.description.clone(),
                    });
                }
            }
        }
        hits
    }

    pub fn assess(&self, path: &str, source: &str, as_of: Option<DateTime<Utc>>) -> RiskAssessment {
        let hits = self.matches(source);
        let mut running = 0.0_f64;
        let mut signals = Vec::new();
        // rules are name-sorted, so this folds in name order
        for rule in &self.rules {
            let count = hits.iter().filter(|h| h.rule == rule.name).count();
            if count == 0 {
                continue;
            }
            let next = running + (1.0 - running) * rule.weight;
            signals.push(Signal {
                name: rule.name.clone(),
                raw: count as f64,
                contribution: next - running,
            });
            running = next;
        }
        let score = running.clamp(0.0, 1.0);
        RiskAssessment {
            subject: path.to_string(),
            kind: AssessmentKind::Security,
            bug_risk: 0.0,
            security_score: score,
            level: SeverityLevel::from_score(score),
            signals,
            as_of,
        }
    }
}

fn compile(name: &str, pattern: &str, weight: f64, description: &str) -> WardenResult<SecurityRule> {
    let regex = Regex::new(pattern)
        .map_err(|e| WardenError::InvalidInput(format!("security rule {name}: {e}")))?;
    Ok(SecurityRule {
        name: name.to_string(),
        weight: weight.clamp(0.0, 1.0),
        description: description.to_string(),
        regex,
    })
}
