use super::StepContext;
use crate::project::{CorrelationData, Issue, IssueId, IssueKind, ProjectId, Severity};
use crate::reasoning::{CorrelationVerdict, IssueBrief};
use crate::store::StoreError;
use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

const DEFAULT_CONFIRMED_CONFIDENCE: f64 = 0.8;

/// Categories whose issues commonly interact. Looked up in both directions.
const ADJACENT_CATEGORIES: &[(&str, &[&str])] = &[
    ("authentication", &["database", "api", "network"]),
    ("database", &["authentication", "memory", "io"]),
    ("api", &["authentication", "network", "timeout"]),
    ("memory", &["database", "io", "algorithm"]),
    ("io", &["database", "memory", "network"]),
    ("network", &["api", "io", "timeout"]),
];

fn listed_adjacent(from: &str, to: &str) -> bool {
    ADJACENT_CATEGORIES
        .iter()
        .any(|(category, neighbours)| *category == from && neighbours.contains(&to))
}

pub fn categories_adjacent(a: &str, b: &str) -> bool {
    listed_adjacent(a, b) || listed_adjacent(b, a)
}

/// Cheap local check deciding whether a pair is worth a correlation call.
/// Issues from the same file (or without a file) are never candidates.
pub fn is_correlation_candidate(a: &Issue, b: &Issue) -> bool {
    match (a.file_id, b.file_id) {
        (Some(fa), Some(fb)) if fa != fb => {}
        _ => return false,
    }

    let (cat_a, cat_b) = (a.category.to_lowercase(), b.category.to_lowercase());
    if cat_a == cat_b || categories_adjacent(&cat_a, &cat_b) {
        return true;
    }

    let kw_b = b.correlation.keywords();
    a.correlation.keywords().iter().any(|kw| kw_b.contains(kw))
}

fn brief(issue: &Issue) -> IssueBrief {
    IssueBrief {
        title: issue.title.clone(),
        description: issue.description.clone(),
        category: issue.category.clone(),
        keywords: issue.correlation.keywords().to_vec(),
    }
}

fn confirmed_description(
    first: &Issue,
    first_file: &str,
    second: &Issue,
    second_file: &str,
    explanation: Option<&str>,
) -> String {
    format!(
        "Confirmed issue found across multiple files:\n\n\
         File 1: {}\nIssue: {}\n{}\n\n\
         File 2: {}\nIssue: {}\n{}\n\n\
         Correlation explanation: {}",
        first_file,
        first.title,
        first.description,
        second_file,
        second.title,
        second.description,
        explanation.unwrap_or("Relationship detected automatically"),
    )
}

fn build_confirmed_issue(
    first: &Issue,
    first_file: &str,
    second: &Issue,
    second_file: &str,
    verdict: &CorrelationVerdict,
) -> Issue {
    let title = verdict
        .combined_description
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Correlation: {} + {}", first.title, second.title));

    let explanation = verdict
        .correlation_explanation
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());

    let confidence = verdict
        .correlation_confidence
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_CONFIRMED_CONFIDENCE);

    Issue {
        id: Uuid::new_v4(),
        project_id: first.project_id,
        file_id: None,
        kind: IssueKind::Confirmed,
        title,
        description: confirmed_description(first, first_file, second, second_file, explanation),
        line_number: None,
        code_snippet: String::new(),
        severity: verdict
            .combined_severity
            .as_deref()
            .map(Severity::parse_lenient)
            .unwrap_or_default(),
        category: first.category.clone(),
        fix_suggestion: None,
        correlation: CorrelationData::Confirmed {
            source_issue_ids: [first.id, second.id],
            confidence,
            file_names: [first_file.to_string(), second_file.to_string()],
        },
        created_at: Utc::now(),
    }
}

/// Pair up potential issues across files and materialise confirmed issues.
///
/// Eligibility is decided on the snapshot taken at the start of the pass.
/// A failed pair is logged and skipped; everything the pass produced is
/// committed in one step at the end.
pub async fn correlate(
    ctx: StepContext<'_>,
    project_id: ProjectId,
) -> Result<Vec<Issue>, StoreError> {
    let potentials = ctx.store.issues(project_id, Some(IssueKind::Potential))?;
    let files: HashMap<_, _> = ctx
        .store
        .files(project_id)?
        .into_iter()
        .map(|f| (f.id, f))
        .collect();

    let mut confirmed: Vec<Issue> = Vec::new();
    let mut back_refs: Vec<(IssueId, IssueId)> = Vec::new();
    let mut compared = 0usize;

    for (i, first) in potentials.iter().enumerate() {
        for second in &potentials[i + 1..] {
            if !is_correlation_candidate(first, second) {
                continue;
            }
            let (Some(file_a), Some(file_b)) = (
                first.file_id.and_then(|id| files.get(&id)),
                second.file_id.and_then(|id| files.get(&id)),
            ) else {
                continue;
            };

            compared += 1;
            let verdict = match ctx
                .bounded(ctx.reasoner.correlate(
                    &brief(first),
                    &brief(second),
                    &file_a.content,
                    &file_b.content,
                ))
                .await
            {
                Ok(verdict) => verdict,
                Err(err) => {
                    tracing::warn!(
                        issue_a = %first.id,
                        issue_b = %second.id,
                        "correlation check failed: {}",
                        err
                    );
                    continue;
                }
            };
            if !verdict.is_correlated {
                continue;
            }

            let issue = build_confirmed_issue(first, &file_a.name, second, &file_b.name, &verdict);
            back_refs.push((first.id, issue.id));
            back_refs.push((second.id, issue.id));
            tracing::debug!(
                confirmed = %issue.id,
                files = ?[&file_a.name, &file_b.name],
                "issues correlated"
            );
            confirmed.push(issue);
        }
    }

    if !confirmed.is_empty() {
        ctx.store
            .commit_correlation(project_id, confirmed.clone(), back_refs)?;
    }

    tracing::info!(
        %project_id,
        potential = potentials.len(),
        compared,
        confirmed = confirmed.len(),
        "correlation pass finished"
    );
    Ok(confirmed)
}
