//! Advisory file review. Produces findings, never a verdict.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::security::RuleSet;
use crate::index::parser::{extract_markers, ParserRegistry, SymbolKind};

pub const MAX_LINE_LENGTH: usize = 120;

static DEBUG_OUTPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\bconsole\.(?:log|debug)\s*\(|\bdbg!\s*\(|\bprintln!\s*\(|\bSystem\.out\.print(?:ln)?\s*\(|\bfmt\.Print(?:ln|f)?\s*\(|^\s*print\s*\()")
        .expect("debug output regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingCategory {
    Security,
    Marker,
    DebugOutput,
    LongLine,
    Undocumented,
}

impl FindingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Marker => "marker",
            Self::DebugOutput => "debug-output",
            Self::LongLine => "long-line",
            Self::Undocumented => "undocumented",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub path: String,
    pub line: u32,
    pub category: FindingCategory,
    pub message: String,
}

/// Review `source` as the file at `path`.
pub fn review(path: &str, source: &str, rules: &RuleSet, registry: &ParserRegistry) -> Vec<Finding> {
    let mut findings = Vec::new();
    let finding = |line: u32, category, message: String| Finding {
        path: path.to_string(),
        line,
        category,
        message,
    };

    for hit in rules.matches(source) {
        findings.push(finding(
            hit.line,
            FindingCategory::Security,
            format!("{} ({})", hit.description, hit.rule),
        ));
    }

    for marker in extract_markers(source) {
        let message = if marker.text.is_empty() {
            format!("{} marker", marker.tag)
        } else {
            format!("{}: {}", marker.tag, marker.text)
        };
        findings.push(finding(marker.line, FindingCategory::Marker, message));
    }

    let lines: Vec<&str> = source.lines().collect();
    for (idx, line) in lines.iter().enumerate() {
        let number = idx as u32 + 1;
        if DEBUG_OUTPUT_RE.is_match(line) {
            findings.push(finding(
                number,
                FindingCategory::DebugOutput,
                "debug output left in code".to_string(),
            ));
        }
        let width = line.chars().count();
        if width > MAX_LINE_LENGTH {
            findings.push(finding(
                number,
                FindingCategory::LongLine,
                format!("line is {width} characters (limit {MAX_LINE_LENGTH})"),
            ));
        }
    }

    let parser = registry.resolve(std::path::Path::new(path));
    let language = parser.language();
    for decl in parser.parse(source).declarations {
        if decl.kind == SymbolKind::Value {
            continue;
        }
        let idx = decl.line.saturating_sub(1) as usize;
        let Some(line) = lines.get(idx) else {
            continue;
        };
        if !is_public(language, line, &decl.name) {
            continue;
        }
        if !is_documented(language, &lines, idx) {
            findings.push(finding(
                decl.line,
                FindingCategory::Undocumented,
                format!("{} `{}` has no documentation", decl.kind.as_str(), decl.name),
            ));
        }
    }

    findings.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.category.cmp(&b.category)));
    findings
}

fn is_public(language: &str, line: &str, name: &str) -> bool {
    match language {
        "rust" => line.trim_start().starts_with("pub ") || line.trim_start().starts_with("pub("),
        "python" => !name.starts_with('_'),
        "go" => name.chars().next().is_some_and(|c| c.is_ascii_uppercase()),
        "java" => !line.contains("private "),
        _ => true,
    }
}

fn is_documented(language: &str, lines: &[&str], idx: usize) -> bool {
    if language == "python" {
        // docstring on the first non-blank line of the body
        return lines
            .iter()
            .skip(idx + 1)
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
            .is_some_and(|l| {
                let l = l.trim_start_matches(['r', 'u', 'b', 'R', 'U', 'B']);
                l.starts_with("\"\"\"") || l.starts_with("'''")
            });
    }

    // nearest non-attribute line above the declaration
    lines[..idx]
        .iter()
        .rev()
        .map(|l| l.trim())
        .find(|l| !l.starts_with("#[") && !l.starts_with('@'))
        .is_some_and(|l| {
            l.starts_with("///")
                || l.starts_with("//!")
                || l.starts_with("//")
                || l.starts_with("/**")
                || l.starts_with('*')
                || l.ends_with("*/")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;

    fn run(path: &str, src: &str) -> Vec<Finding> {
        let rules = RuleSet::from_config(&SecurityConfig::default()).unwrap();
        review(path, src, &rules, &ParserRegistry::with_defaults())
    }

    fn categories(findings: &[Finding]) -> Vec<FindingCategory> {
        findings.iter().map(|f| f.category).collect()
    }

    #[test]
    fn missing_python_docstring_is_reported() {
        let findings = run(
            "app.py",
            "def documented():\n    \"\"\"Does things.\"\"\"\n    return 1\n\ndef bare():\n    return 2\n\ndef _private():\n    return 3\n",
        );
        let undocumented: Vec<&Finding> = findings
            .iter()
            .filter(|f| f.category == FindingCategory::Undocumented)
            .collect();
        assert_eq!(undocumented.len(), 1);
        assert_eq!(undocumented[0].line, 5);
        assert!(undocumented[0].message.contains("bare"));
    }

    #[test]
    fn rust_doc_comment_above_attributes_counts() {
        let findings = run(
            "lib.rs",
            "/// Documented.\n#[inline]\npub fn one() {}\n\npub fn two() {}\n\nfn private() {}\n",
        );
        let undocumented: Vec<u32> = findings
            .iter()
            .filter(|f| f.category == FindingCategory::Undocumented)
            .map(|f| f.line)
            .collect();
        assert_eq!(undocumented, vec![5]);
    }

    #[test]
    fn security_marker_debug_and_long_lines() {
        let long = format!("x = '{}'", "a".repeat(130));
        let src = format!(
            "password = \"hunter22\"  # TODO rotate\nprint(\"debug\")\n{long}\n"
        );
        let findings = run("settings.py", &src);
        let cats = categories(&findings);
        assert!(cats.contains(&FindingCategory::Security));
        assert!(cats.contains(&FindingCategory::Marker));
        assert!(cats.contains(&FindingCategory::DebugOutput));
        assert!(cats.contains(&FindingCategory::LongLine));
    }

    #[test]
    fn clean_documented_file_has_no_findings() {
        let findings = run("lib.rs", "//! Crate docs.\n\n/// Adds.\npub fn add(a: u8, b: u8) -> u8 {\n    a + b\n}\n");
        assert!(findings.is_empty(), "{findings:?}");
    }
}
