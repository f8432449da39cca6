use crate::classify::FileType;
use crate::hints::ContentHints;

use super::IssueBrief;

pub const ANALYSIS_SYSTEM: &str = r#"You are a performance testing expert. Analyze code and configuration for performance problems and likely bottlenecks under load.

OUTPUT FORMAT (JSON):
{
  "issues": [
    {
      "title": "short name of the problem",
      "description": "what goes wrong under load and why",
      "line_number": 42,
      "code_snippet": "the offending lines, verbatim",
      "severity": "low|medium|high|critical",
      "category": "authentication|database|api|network|timeout|memory|io|algorithm|concurrency|cache|configuration|other",
      "correlation_keywords": ["keywords", "that", "could", "link", "this", "to", "other", "files"],
      "confidence": 0.0
    }
  ]
}

RULES:
- Report only problems that matter under load: blocking I/O, N+1 queries, missing pooling, unbounded caches, lock contention, missing timeouts, chatty network calls, inefficient load-test scenarios
- line_number refers to the file as shown; omit it when unsure
- correlation_keywords should name shared resources (tables, endpoints, pools, hosts, tokens) so the issue can be matched against other files
- confidence is your certainty between 0 and 1
- Return {"issues": []} when nothing stands out"#;

pub const CORRELATION_SYSTEM: &str = r#"You are a performance engineer deciding whether two issues found in different files of the same system share a root cause or amplify each other under load.

OUTPUT FORMAT (JSON):
{
  "is_correlated": true,
  "combined_description": "one-line title for the combined problem",
  "combined_severity": "low|medium|high|critical",
  "correlation_explanation": "how the two issues interact",
  "correlation_confidence": 0.0
}

RULES:
- Only answer true when the files plausibly interact at runtime (one calls, configures, or load-tests the other, or both use the same resource)
- Same category alone is not enough
- When false, the other fields may be omitted"#;

pub const FIX_SYSTEM: &str = r#"You are a senior performance engineer proposing a concrete fix for one issue.

OUTPUT FORMAT (JSON):
{
  "fix_steps": ["ordered, concrete steps"],
  "fixed_code": "replacement code for the snippet, or empty when not applicable",
  "explanation": "why the fix removes the bottleneck",
  "estimated_improvement": "expected effect, e.g. p95 latency or throughput",
  "alternatives": ["other viable approaches"]
}

RULES:
- Keep fixed_code minimal and in the same language as the snippet
- Prefer configuration changes over rewrites when they solve the problem"#;

/// User prompt for single-file analysis. `content` is expected to be
/// already cut to the prompt budget.
pub fn analysis_user(
    file_name: &str,
    file_type: FileType,
    content: &str,
    hints: &ContentHints,
) -> String {
    let mut prompt = format!(
        "Analyze the following file for performance problems in the context of load testing.\n\nFile name: {}\nFile type: {}\n",
        file_name, file_type
    );

    if !hints.is_empty() {
        prompt.push_str("\nHINTS (from a quick scan, may be incomplete):\n");
        push_hint_line(&mut prompt, "Performance keywords", &hints.keywords);
        push_hint_line(&mut prompt, "Functions", &hints.functions);
        push_hint_line(&mut prompt, "Imports", &hints.imports);
    }

    prompt.push_str("\nCODE:\n```\n");
    prompt.push_str(content);
    prompt.push_str("\n```\n");
    prompt
}

fn push_hint_line(prompt: &mut String, label: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    prompt.push_str(&format!("- {}: {}\n", label, values.join(", ")));
}

pub fn correlation_user(
    first: &IssueBrief,
    second: &IssueBrief,
    first_content: &str,
    second_content: &str,
) -> String {
    format!(
        "ISSUE A\n{}\n\nFILE A (excerpt):\n```\n{}\n```\n\nISSUE B\n{}\n\nFILE B (excerpt):\n```\n{}\n```\n\nAre these two issues correlated?",
        describe_issue(first),
        first_content,
        describe_issue(second),
        second_content
    )
}

fn describe_issue(issue: &IssueBrief) -> String {
    let keywords = if issue.keywords.is_empty() {
        "none".to_string()
    } else {
        issue.keywords.join(", ")
    };
    format!(
        "Title: {}\nCategory: {}\nKeywords: {}\nDescription: {}",
        issue.title, issue.category, keywords, issue.description
    )
}

pub fn fix_user(title: &str, description: &str, code_snippet: &str, category: &str) -> String {
    let snippet = if code_snippet.trim().is_empty() {
        "(no snippet available)"
    } else {
        code_snippet
    };
    format!(
        "ISSUE: {}\nCATEGORY: {}\n\nDESCRIPTION:\n{}\n\nCODE:\n```\n{}\n```",
        title, category, description, snippet
    )
}
