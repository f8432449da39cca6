use super::StepContext;
use crate::classify::classify;
use crate::project::{CorrelationData, FileId, Issue, IssueKind, ProjectId, Severity, SourceFile};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

const DEFAULT_TITLE: &str = "unknown issue";
const DEFAULT_DESCRIPTION: &str = "no description";
const DEFAULT_CATEGORY: &str = "other";
const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("issue record is not a JSON object")]
    NotAnObject,
    #[error("issue record has unusable fields: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Issue record as the reasoning service reports it. Everything is optional.
#[derive(Debug, Deserialize)]
struct RawIssue {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    line_number: Option<Value>,
    #[serde(default)]
    code_snippet: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default, alias = "potential_correlation")]
    correlation_keywords: Option<Vec<String>>,
    #[serde(default)]
    confidence: Option<f64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accept `42`, `"42"` or `"L42"`; anything else means no line.
fn parse_line_number(value: Option<&Value>) -> Option<u32> {
    let line = match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().trim_start_matches(['L', 'l']).parse().ok(),
        _ => None,
    };
    line.filter(|n| *n > 0)
}

/// Turn one raw record into a potential issue, filling in defaults.
pub fn build_potential_issue(
    record: &Value,
    project_id: ProjectId,
    file_id: FileId,
) -> Result<Issue, RecordError> {
    if !record.is_object() {
        return Err(RecordError::NotAnObject);
    }
    let raw = RawIssue::deserialize(record)?;

    let keywords = {
        let mut seen: Vec<String> = Vec::new();
        for kw in raw.correlation_keywords.unwrap_or_default() {
            let kw = kw.trim().to_lowercase();
            if !kw.is_empty() && !seen.contains(&kw) {
                seen.push(kw);
            }
        }
        seen
    };

    Ok(Issue {
        id: Uuid::new_v4(),
        project_id,
        file_id: Some(file_id),
        kind: IssueKind::Potential,
        title: non_blank(raw.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        description: non_blank(raw.description)
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        line_number: parse_line_number(raw.line_number.as_ref()),
        code_snippet: raw.code_snippet.unwrap_or_default(),
        severity: raw
            .severity
            .as_deref()
            .map(Severity::parse_lenient)
            .unwrap_or_default(),
        category: non_blank(raw.category)
            .map(|c| c.to_lowercase())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        fix_suggestion: None,
        correlation: CorrelationData::Potential {
            keywords,
            confidence: raw
                .confidence
                .filter(|c| c.is_finite())
                .map(|c| c.clamp(0.0, 1.0))
                .unwrap_or(DEFAULT_CONFIDENCE),
        },
        created_at: Utc::now(),
    })
}

/// Analyse one file and persist its potential issues.
///
/// Never fails: a failed analysis or a failed commit yields an empty list and
/// leaves the file unprocessed.
pub async fn extract(ctx: StepContext<'_>, file: &SourceFile) -> Vec<Issue> {
    let file_type = file
        .file_type
        .unwrap_or_else(|| classify(&file.name, &file.content));

    let report = match ctx
        .bounded(ctx.reasoner.analyze(&file.name, &file.content, file_type))
        .await
    {
        Ok(report) => report,
        Err(err) => {
            tracing::warn!(file = %file.name, %file_type, "analysis failed: {}", err);
            return Vec::new();
        }
    };

    if let Some(message) = report.error.as_deref().filter(|m| !m.trim().is_empty()) {
        tracing::warn!(file = %file.name, "analysis reported an error: {}", message);
        return Vec::new();
    }

    let mut issues = Vec::with_capacity(report.issues.len());
    for (index, record) in report.issues.iter().enumerate() {
        match build_potential_issue(record, file.project_id, file.id) {
            Ok(issue) => issues.push(issue),
            Err(err) => {
                tracing::warn!(file = %file.name, record = index, "skipping issue record: {}", err);
            }
        }
    }

    if let Err(err) = ctx
        .store
        .commit_extraction(file.id, file_type, issues.clone())
    {
        tracing::error!(file = %file.name, "failed to store extracted issues: {}", err);
        return Vec::new();
    }

    tracing::info!(
        file = %file.name,
        %file_type,
        issues = issues.len(),
        "file analysed"
    );
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids() -> (ProjectId, FileId) {
        (Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let (project_id, file_id) = ids();
        let issue = build_potential_issue(&json!({}), project_id, file_id).unwrap();
        assert_eq!(issue.title, "unknown issue");
        assert_eq!(issue.description, "no description");
        assert_eq!(issue.severity, Severity::Medium);
        assert_eq!(issue.category, "other");
        assert_eq!(issue.code_snippet, "");
        assert_eq!(issue.kind, IssueKind::Potential);
        assert_eq!(issue.file_id, Some(file_id));
        assert_eq!(issue.correlation.confidence(), 0.5);
    }

    #[test]
    fn test_null_fields_take_defaults() {
        let (project_id, file_id) = ids();
        let record = json!({
            "title": "Pool exhausted",
            "severity": null,
            "category": null,
            "correlation_keywords": null,
            "confidence": null,
        });
        let issue = build_potential_issue(&record, project_id, file_id).unwrap();
        assert_eq!(issue.title, "Pool exhausted");
        assert_eq!(issue.severity, Severity::Medium);
        assert_eq!(issue.category, "other");
        assert!(issue.correlation.keywords().is_empty());
        assert_eq!(issue.correlation.confidence(), 0.5);
    }

    #[test]
    fn test_full_record() {
        let (project_id, file_id) = ids();
        let record = json!({
            "title": "String-built SQL",
            "description": "Query concatenates user input",
            "line_number": 12,
            "code_snippet": "cur.execute(\"SELECT \" + q)",
            "severity": "HIGH",
            "category": "Database",
            "correlation_keywords": ["Users", "users", " query "],
            "confidence": 0.9
        });
        let issue = build_potential_issue(&record, project_id, file_id).unwrap();
        assert_eq!(issue.line_number, Some(12));
        assert_eq!(issue.severity, Severity::High);
        assert_eq!(issue.category, "database");
        assert_eq!(issue.correlation.keywords(), ["users", "query"]);
        assert_eq!(issue.correlation.confidence(), 0.9);
    }

    #[test]
    fn test_legacy_keyword_field_and_string_line() {
        let (project_id, file_id) = ids();
        let record = json!({
            "potential_correlation": ["token"],
            "line_number": "L7",
            "severity": "urgent"
        });
        let issue = build_potential_issue(&record, project_id, file_id).unwrap();
        assert_eq!(issue.correlation.keywords(), ["token"]);
        assert_eq!(issue.line_number, Some(7));
        assert_eq!(issue.severity, Severity::Medium);
    }

    #[test]
    fn test_malformed_records_are_rejected() {
        let (project_id, file_id) = ids();
        assert!(matches!(
            build_potential_issue(&json!("just text"), project_id, file_id),
            Err(RecordError::NotAnObject)
        ));
        assert!(matches!(
            build_potential_issue(&json!({"title": 5}), project_id, file_id),
            Err(RecordError::Invalid(_))
        ));
    }

    #[test]
    fn test_out_of_range_confidence_is_clamped() {
        let (project_id, file_id) = ids();
        let issue =
            build_potential_issue(&json!({"confidence": 7.0}), project_id, file_id).unwrap();
        assert_eq!(issue.correlation.confidence(), 1.0);
    }
}
