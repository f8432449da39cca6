//! Content hints for analysis prompts
//!
//! Cheap regex/keyword scans that give the reasoning service a head start:
//! which performance-relevant terms appear, which functions are defined and
//! which modules are imported. Output is deduplicated and sorted so the same
//! file always yields the same prompt.

use crate::classify::FileType;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Terms that usually point at performance-sensitive code
const PERFORMANCE_KEYWORDS: &[&str] = &[
    // Authentication
    "auth", "login", "authenticate", "token", "session", "oauth",
    // Database
    "connection", "database", "query", "sql", "cursor", "transaction", "commit", "rollback",
    "pool", "datasource",
    // Network / API
    "request", "response", "http", "api", "rest", "soap", "client", "timeout", "retry",
    "circuit", "breaker",
    // Concurrency
    "thread", "async", "await", "parallel", "concurrent", "lock", "synchronize", "mutex",
    "semaphore",
    // Memory
    "cache", "memory", "heap", "gc", "garbage", "collection", "buffer",
    // I/O
    "file", "read", "write", "stream", "io", "disk", "network",
    // Load testing
    "test", "load", "stress", "benchmark", "performance", "throughput", "latency",
    "response_time", "rps", "tps",
];

/// Hints collected for one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentHints {
    pub keywords: Vec<String>,
    pub functions: Vec<String>,
    pub imports: Vec<String>,
}

impl ContentHints {
    pub fn collect(content: &str, file_type: FileType) -> Self {
        Self {
            keywords: find_performance_keywords(content),
            functions: extract_function_names(content, file_type),
            imports: extract_imports(content, file_type),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.functions.is_empty() && self.imports.is_empty()
    }
}

/// Performance keywords present anywhere in the content (substring match).
pub fn find_performance_keywords(content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    let found: BTreeSet<&str> = PERFORMANCE_KEYWORDS
        .iter()
        .copied()
        .filter(|kw| lower.contains(kw))
        .collect();
    found.into_iter().map(str::to_string).collect()
}

struct HintPatterns {
    python_def: Regex,
    java_method: Regex,
    js_functions: Vec<Regex>,
    go_func: Regex,
    python_imports: Vec<Regex>,
    java_import: Regex,
    js_imports: Vec<Regex>,
}

fn patterns() -> &'static HintPatterns {
    static PATTERNS: OnceLock<HintPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| HintPatterns {
        python_def: compile(r"def\s+(\w+)\s*\("),
        java_method: compile(r"(?:public|private|protected)?\s*(?:static)?\s*\w+\s+(\w+)\s*\("),
        js_functions: vec![
            compile(r"function\s+(\w+)\s*\("),
            compile(r"(\w+)\s*:\s*function\s*\("),
            compile(r"const\s+(\w+)\s*=\s*\("),
            compile(r"let\s+(\w+)\s*=\s*\("),
            compile(r"var\s+(\w+)\s*=\s*function"),
        ],
        go_func: compile(r"func\s+(\w+)\s*\("),
        python_imports: vec![
            compile(r"import\s+(\w+(?:\.\w+)*)"),
            compile(r"from\s+(\w+(?:\.\w+)*)\s+import"),
        ],
        java_import: compile(r"import\s+([a-zA-Z_][a-zA-Z0-9_.]*);"),
        js_imports: vec![
            compile(r#"import.*from\s+['"]([^'"]+)['"]"#),
            compile(r#"require\s*\(\s*['"]([^'"]+)['"]"#),
        ],
    })
}

fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(err) => panic!("invalid hint pattern {pattern:?}: {err}"),
    }
}

fn captures(patterns: &[&Regex], content: &str) -> Vec<String> {
    let found: BTreeSet<String> = patterns
        .iter()
        .flat_map(|re| re.captures_iter(content))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect();
    found.into_iter().collect()
}

/// Function/method names defined in the content, for the languages we know.
pub fn extract_function_names(content: &str, file_type: FileType) -> Vec<String> {
    let p = patterns();
    match file_type {
        FileType::Python => captures(&[&p.python_def], content),
        FileType::Java => captures(&[&p.java_method], content),
        FileType::JavaScript => captures(&p.js_functions.iter().collect::<Vec<_>>(), content),
        FileType::Go => captures(&[&p.go_func], content),
        _ => Vec::new(),
    }
}

/// Imported module names, for the languages we know.
pub fn extract_imports(content: &str, file_type: FileType) -> Vec<String> {
    let p = patterns();
    match file_type {
        FileType::Python => captures(&p.python_imports.iter().collect::<Vec<_>>(), content),
        FileType::Java => captures(&[&p.java_import], content),
        FileType::JavaScript => captures(&p.js_imports.iter().collect::<Vec<_>>(), content),
        _ => Vec::new(),
    }
}
