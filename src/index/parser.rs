//! Language parser registry and line-based regex parsers.
//!
//! Parsers only need to find declarations, identifier references, and marker
//! comments. Anything they cannot recognise is ignored; the scan never fails
//! because of unusual syntax.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Broad symbol category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Type,
    Value,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Type => "type",
            SymbolKind::Value => "value",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub kind: SymbolKind,
    pub line: u32,
}

/// A TODO/FIXME/HACK/XXX comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub line: u32,
    pub tag: String,
    pub text: String,
}

/// Output of a parser run over one file.
#[derive(Debug, Clone, Default)]
pub struct ParsedSource {
    pub declarations: Vec<Declaration>,
    /// Identifiers used in the file that it does not itself declare.
    pub references: BTreeSet<String>,
    pub markers: Vec<Marker>,
}

pub trait LanguageParser: Send + Sync {
    fn language(&self) -> &'static str;
    fn extensions(&self) -> &'static [&'static str];
    fn parse(&self, source: &str) -> ParsedSource;
}

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(TODO|FIXME|HACK|XXX)\b[:(\s]*(.*)$").expect("marker regex is valid")
});

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]+").expect("identifier regex is valid"));

/// Marker comments in `source`, with 1-based line numbers.
pub fn extract_markers(source: &str) -> Vec<Marker> {
    source
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            MARKER_RE.captures(line).map(|caps| Marker {
                line: idx as u32 + 1,
                tag: caps[1].to_string(),
                text: caps[2].trim().trim_end_matches("*/").trim().to_string(),
            })
        })
        .collect()
}

/// One declaration pattern: capture group `group` holds the name.
struct Rule {
    re: &'static LazyLock<Regex>,
    group: usize,
    kind: SymbolKind,
}

fn run_rules(source: &str, rules: &[Rule], keywords: &[&str]) -> ParsedSource {
    let mut declarations = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        for rule in rules {
            if let Some(caps) = rule.re.captures(line) {
                if let Some(name) = caps.get(rule.group) {
                    declarations.push(Declaration {
                        name: name.as_str().to_string(),
                        kind: rule.kind,
                        line: idx as u32 + 1,
                    });
                    break;
                }
            }
        }
    }

    let declared: BTreeSet<&str> = declarations.iter().map(|d| d.name.as_str()).collect();
    let references = IDENT_RE
        .find_iter(source)
        .map(|m| m.as_str())
        .filter(|tok| !declared.contains(tok) && !keywords.contains(tok))
        .map(str::to_string)
        .collect();

    ParsedSource {
        declarations,
        references,
        markers: extract_markers(source),
    }
}

// -- Rust ---------------------------------------------------------------------

static RS_FN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+([A-Za-z_][A-Za-z0-9_]*)"#,
    )
    .expect("rust fn regex is valid")
});
static RS_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:unsafe\s+)?(?:struct|enum|trait|type|union)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("rust type regex is valid")
});
static RS_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const|static)\s+(?:mut\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*:")
        .expect("rust value regex is valid")
});

const RS_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub",
    "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true", "type", "unsafe",
    "use", "where", "while",
];

pub struct RustParser;

impl LanguageParser for RustParser {
    fn language(&self) -> &'static str {
        "rust"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }
    fn parse(&self, source: &str) -> ParsedSource {
        let rules = [
            Rule { re: &RS_FN_RE, group: 1, kind: SymbolKind::Function },
            Rule { re: &RS_TYPE_RE, group: 1, kind: SymbolKind::Type },
            Rule { re: &RS_VALUE_RE, group: 1, kind: SymbolKind::Value },
        ];
        run_rules(source, &rules, RS_KEYWORDS)
    }
}

// -- Python -------------------------------------------------------------------

static PY_DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)").expect("python def regex is valid")
});
static PY_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*class\s+([A-Za-z_][A-Za-z0-9_]*)").expect("python class regex is valid")
});
static PY_CONST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z_][A-Z0-9_]*)\s*(?::[^=]*)?=[^=]").expect("python const regex is valid")
});

const PY_KEYWORDS: &[&str] = &[
    "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
    "else", "except", "False", "finally", "for", "from", "global", "if", "import", "in", "is",
    "lambda", "None", "nonlocal", "not", "or", "pass", "raise", "return", "self", "True", "try",
    "while", "with", "yield",
];

pub struct PythonParser;

impl LanguageParser for PythonParser {
    fn language(&self) -> &'static str {
        "python"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }
    fn parse(&self, source: &str) -> ParsedSource {
        let rules = [
            Rule { re: &PY_DEF_RE, group: 1, kind: SymbolKind::Function },
            Rule { re: &PY_CLASS_RE, group: 1, kind: SymbolKind::Type },
            Rule { re: &PY_CONST_RE, group: 1, kind: SymbolKind::Value },
        ];
        run_rules(source, &rules, PY_KEYWORDS)
    }
}

// -- JavaScript / TypeScript --------------------------------------------------

static JS_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][A-Za-z0-9_$]*)")
        .expect("js function regex is valid")
});
static JS_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:class|interface|type|enum)\s+([A-Za-z_$][A-Za-z0-9_$]*)")
        .expect("js class regex is valid")
});
static JS_ARROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][A-Za-z0-9_$]*)\s*(?::[^=]+)?=>")
        .expect("js arrow regex is valid")
});
static JS_CONST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*(?::[^=]+)?=")
        .expect("js const regex is valid")
});

const JS_KEYWORDS: &[&str] = &[
    "async", "await", "break", "case", "catch", "class", "const", "continue", "default", "delete",
    "do", "else", "enum", "export", "extends", "false", "finally", "for", "from", "function", "if",
    "import", "in", "instanceof", "interface", "let", "new", "null", "of", "return", "static",
    "super", "switch", "this", "throw", "true", "try", "type", "typeof", "undefined", "var",
    "void", "while", "yield",
];

pub struct JavaScriptParser;

impl LanguageParser for JavaScriptParser {
    fn language(&self) -> &'static str {
        "javascript"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["js", "jsx", "mjs", "cjs", "ts", "tsx"]
    }
    fn parse(&self, source: &str) -> ParsedSource {
        let rules = [
            Rule { re: &JS_FUNCTION_RE, group: 1, kind: SymbolKind::Function },
            Rule { re: &JS_CLASS_RE, group: 1, kind: SymbolKind::Type },
            Rule { re: &JS_ARROW_RE, group: 1, kind: SymbolKind::Function },
            Rule { re: &JS_CONST_RE, group: 1, kind: SymbolKind::Value },
        ];
        run_rules(source, &rules, JS_KEYWORDS)
    }
}

// -- Go -----------------------------------------------------------------------

static GO_FUNC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^func\s+(?:\([^)]*\)\s*)?([A-Za-z_][A-Za-z0-9_]*)").expect("go func regex is valid")
});
static GO_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^type\s+([A-Za-z_][A-Za-z0-9_]*)").expect("go type regex is valid")
});
static GO_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:const|var)\s+([A-Za-z_][A-Za-z0-9_]*)").expect("go value regex is valid")
});

const GO_KEYWORDS: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
    "for", "func", "go", "goto", "if", "import", "interface", "map", "nil", "package", "range",
    "return", "select", "struct", "switch", "type", "var",
];

pub struct GoParser;

impl LanguageParser for GoParser {
    fn language(&self) -> &'static str {
        "go"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["go"]
    }
    fn parse(&self, source: &str) -> ParsedSource {
        let rules = [
            Rule { re: &GO_FUNC_RE, group: 1, kind: SymbolKind::Function },
            Rule { re: &GO_TYPE_RE, group: 1, kind: SymbolKind::Type },
            Rule { re: &GO_VALUE_RE, group: 1, kind: SymbolKind::Value },
        ];
        run_rules(source, &rules, GO_KEYWORDS)
    }
}

// -- Java ---------------------------------------------------------------------

static JAVA_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|protected|private|abstract|final|static|sealed)\s+)*(?:class|interface|enum|record)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("java class regex is valid")
});
static JAVA_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|protected|private|static|final|abstract|synchronized|native|default)\s+)+[A-Za-z_][A-Za-z0-9_<>,.?\[\]\s]*?\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(")
        .expect("java method regex is valid")
});

const JAVA_KEYWORDS: &[&str] = &[
    "abstract", "boolean", "break", "case", "catch", "class", "continue", "default", "do",
    "double", "else", "enum", "extends", "false", "final", "finally", "float", "for", "if",
    "implements", "import", "instanceof", "int", "interface", "long", "new", "null", "package",
    "private", "protected", "public", "return", "static", "super", "switch", "synchronized",
    "this", "throw", "throws", "true", "try", "void", "while",
];

pub struct JavaParser;

impl LanguageParser for JavaParser {
    fn language(&self) -> &'static str {
        "java"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["java"]
    }
    fn parse(&self, source: &str) -> ParsedSource {
        let rules = [
            Rule { re: &JAVA_CLASS_RE, group: 1, kind: SymbolKind::Type },
            Rule { re: &JAVA_METHOD_RE, group: 1, kind: SymbolKind::Function },
        ];
        run_rules(source, &rules, JAVA_KEYWORDS)
    }
}

// -- Fallback -----------------------------------------------------------------

/// Used for any extension without a registered parser: no symbols, markers only.
pub struct NoopParser;

impl LanguageParser for NoopParser {
    fn language(&self) -> &'static str {
        "unknown"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &[]
    }
    fn parse(&self, source: &str) -> ParsedSource {
        ParsedSource {
            markers: extract_markers(source),
            ..ParsedSource::default()
        }
    }
}

/// Extension → parser lookup.
#[derive(Clone)]
pub struct ParserRegistry {
    by_extension: HashMap<String, Arc<dyn LanguageParser>>,
    fallback: Arc<dyn LanguageParser>,
}

impl ParserRegistry {
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
            fallback: Arc::new(NoopParser),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(RustParser));
        registry.register(Arc::new(PythonParser));
        registry.register(Arc::new(JavaScriptParser));
        registry.register(Arc::new(GoParser));
        registry.register(Arc::new(JavaParser));
        registry
    }

    /// Later registrations win for shared extensions.
    pub fn register(&mut self, parser: Arc<dyn LanguageParser>) {
        for ext in parser.extensions() {
            self.by_extension.insert(ext.to_ascii_lowercase(), Arc::clone(&parser));
        }
    }

    pub fn resolve(&self, path: &Path) -> Arc<dyn LanguageParser> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.by_extension.get(&ext.to_ascii_lowercase()))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
