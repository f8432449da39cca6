//! File type classification
//!
//! Fast, pattern-based detection of the coarse file type used to annotate
//! analysis requests. Resolution order:
//! 1. Extension (or exact file name) lookup
//! 2. Content sniffing over the first 1000 characters, first match wins
//! 3. `Unknown`

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Number of leading characters inspected when sniffing content
const SNIFF_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Python,
    Java,
    JavaScript,
    JMeter,
    Yaml,
    Json,
    Xml,
    Shell,
    Sql,
    Properties,
    Config,
    Dockerfile,
    Go,
    Ruby,
    Php,
    CSharp,
    Scala,
    Kotlin,
    Unknown,
}

impl FileType {
    pub const ALL: [FileType; 19] = [
        FileType::Python,
        FileType::Java,
        FileType::JavaScript,
        FileType::JMeter,
        FileType::Yaml,
        FileType::Json,
        FileType::Xml,
        FileType::Shell,
        FileType::Sql,
        FileType::Properties,
        FileType::Config,
        FileType::Dockerfile,
        FileType::Go,
        FileType::Ruby,
        FileType::Php,
        FileType::CSharp,
        FileType::Scala,
        FileType::Kotlin,
        FileType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Python => "python",
            FileType::Java => "java",
            FileType::JavaScript => "javascript",
            FileType::JMeter => "jmeter",
            FileType::Yaml => "yaml",
            FileType::Json => "json",
            FileType::Xml => "xml",
            FileType::Shell => "shell",
            FileType::Sql => "sql",
            FileType::Properties => "properties",
            FileType::Config => "config",
            FileType::Dockerfile => "dockerfile",
            FileType::Go => "go",
            FileType::Ruby => "ruby",
            FileType::Php => "php",
            FileType::CSharp => "csharp",
            FileType::Scala => "scala",
            FileType::Kotlin => "kotlin",
            FileType::Unknown => "unknown",
        }
    }

    /// Parse a caller-supplied tag. `unknown` and unrecognised tags yield `None`
    /// so the file gets classified later.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_lowercase();
        FileType::ALL
            .into_iter()
            .find(|t| *t != FileType::Unknown && t.as_str() == tag)
    }

    fn from_extension(ext: &str) -> Option<Self> {
        let file_type = match ext {
            "py" => FileType::Python,
            "java" => FileType::Java,
            "js" | "ts" => FileType::JavaScript,
            "jmx" => FileType::JMeter,
            "yaml" | "yml" => FileType::Yaml,
            "json" => FileType::Json,
            "xml" => FileType::Xml,
            "sh" | "bash" => FileType::Shell,
            "sql" => FileType::Sql,
            "properties" => FileType::Properties,
            "conf" | "config" => FileType::Config,
            "dockerfile" => FileType::Dockerfile,
            "go" => FileType::Go,
            "rb" => FileType::Ruby,
            "php" => FileType::Php,
            "cs" => FileType::CSharp,
            "scala" => FileType::Scala,
            "kt" => FileType::Kotlin,
            _ => return None,
        };
        Some(file_type)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a file by name, falling back to its content.
pub fn classify(name: &str, content: &str) -> FileType {
    detect_by_name(name)
        .or_else(|| detect_by_content(content))
        .unwrap_or(FileType::Unknown)
}

fn detect_by_name(name: &str) -> Option<FileType> {
    let lower = name.to_lowercase();
    if lower == "dockerfile" {
        return Some(FileType::Dockerfile);
    }
    let (_, ext) = lower.rsplit_once('.')?;
    FileType::from_extension(ext)
}

struct ContentPatterns {
    python: Regex,
    java: Regex,
    javascript: Regex,
    yaml: Regex,
    xml_tag: Regex,
    sql: Regex,
}

fn patterns() -> &'static ContentPatterns {
    static PATTERNS: OnceLock<ContentPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| ContentPatterns {
        python: compile(r"def\s+\w+\s*\(|import\s+\w+|from\s+\w+\s+import"),
        java: compile(r"public\s+class|private\s+\w+|import\s+java\.|package\s+\w+"),
        javascript: compile(r"function\s+\w+\s*\(|var\s+\w+|let\s+\w+|const\s+\w+|console\.log"),
        yaml: compile(r"(?m)^\s*\w+:\s*$"),
        xml_tag: compile(r"<\w+[^>]*>"),
        sql: compile(r"\b(select|insert|update|delete|create|alter|drop)\b"),
    })
}

// The patterns are literals; a failure here is a programming error caught by tests.
fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(err) => panic!("invalid classifier pattern {pattern:?}: {err}"),
    }
}

fn detect_by_content(content: &str) -> Option<FileType> {
    if content.is_empty() {
        return None;
    }

    let sample: String = content.chars().take(SNIFF_CHARS).collect::<String>().to_lowercase();
    let trimmed = sample.trim();
    let p = patterns();

    if p.python.is_match(&sample) {
        return Some(FileType::Python);
    }
    if p.java.is_match(&sample) {
        return Some(FileType::Java);
    }
    if p.javascript.is_match(&sample) {
        return Some(FileType::JavaScript);
    }
    if sample.contains("<jmetertestplan") || sample.contains("<testplan") {
        return Some(FileType::JMeter);
    }
    if p.yaml.is_match(&sample) {
        return Some(FileType::Yaml);
    }
    if trimmed.starts_with('{') && sample.contains('"') {
        return Some(FileType::Json);
    }
    if trimmed.starts_with("<?xml") || p.xml_tag.is_match(&sample) {
        return Some(FileType::Xml);
    }
    if sample.starts_with("#!") && (sample.contains("bash") || sample.contains("sh")) {
        return Some(FileType::Shell);
    }
    if p.sql.is_match(&sample) {
        return Some(FileType::Sql);
    }
    None
}
