use super::StepContext;
use crate::project::ProjectId;
use crate::reasoning::FixProposal;
use crate::store::StoreError;

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Render a fix proposal as a plain-text block. Sections appear in a fixed
/// order and empty ones are left out.
pub fn format_fix_suggestion(fix: &FixProposal) -> String {
    let mut sections = vec!["FIX SUGGESTION:".to_string()];

    let steps: Vec<&str> = fix
        .fix_steps
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if !steps.is_empty() {
        let numbered: Vec<String> = steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step))
            .collect();
        sections.push(format!("Steps to fix:\n{}", numbered.join("\n")));
    }

    if let Some(code) = fix
        .fixed_code
        .as_deref()
        .filter(|c| !c.trim().is_empty())
    {
        sections.push(format!("Code example:\n```\n{}\n```", code.trim_end()));
    }

    if let Some(explanation) = non_empty(&fix.explanation) {
        sections.push(format!("Explanation:\n{}", explanation));
    }

    if let Some(improvement) = non_empty(&fix.estimated_improvement) {
        sections.push(format!("Expected improvement:\n{}", improvement));
    }

    let alternatives: Vec<String> = fix
        .alternatives
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .map(|a| format!("• {}", a))
        .collect();
    if !alternatives.is_empty() {
        sections.push(format!("Alternatives:\n{}", alternatives.join("\n")));
    }

    sections.join("\n\n")
}

/// Request a suggestion for every issue that has none yet.
///
/// A failed request stores a placeholder with the error so the issue is not
/// asked about again. Returns the number of suggestions written.
pub async fn generate_suggestions(
    ctx: StepContext<'_>,
    project_id: ProjectId,
) -> Result<usize, StoreError> {
    let pending: Vec<_> = ctx
        .store
        .issues(project_id, None)?
        .into_iter()
        .filter(|issue| issue.needs_fix_suggestion())
        .collect();

    if pending.is_empty() {
        tracing::debug!(%project_id, "all issues already have fix suggestions");
        return Ok(0);
    }

    let mut suggestions = Vec::with_capacity(pending.len());
    for issue in &pending {
        let text = match ctx
            .bounded(ctx.reasoner.suggest_fix(
                &issue.title,
                &issue.description,
                &issue.code_snippet,
                &issue.category,
            ))
            .await
        {
            Ok(fix) => format_fix_suggestion(&fix),
            Err(err) => {
                tracing::warn!(issue_id = %issue.id, "fix suggestion failed: {}", err);
                format!("Could not generate an automatic fix suggestion: {}", err)
            }
        };
        suggestions.push((issue.id, text));
    }

    let applied = ctx.store.commit_fix_suggestions(project_id, suggestions)?;
    tracing::info!(%project_id, applied, "fix suggestions stored");
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_suggestion_layout() {
        let fix = FixProposal {
            fix_steps: vec!["Use a connection pool".into(), "Cap pool size at 20".into()],
            fixed_code: Some("pool = create_pool(max=20)\n".into()),
            explanation: Some("Connections are reused".into()),
            estimated_improvement: Some("p95 latency -40%".into()),
            alternatives: vec!["PgBouncer".into()],
        };
        assert_eq!(
            format_fix_suggestion(&fix),
            "FIX SUGGESTION:\n\n\
             Steps to fix:\n1. Use a connection pool\n2. Cap pool size at 20\n\n\
             Code example:\n```\npool = create_pool(max=20)\n```\n\n\
             Explanation:\nConnections are reused\n\n\
             Expected improvement:\np95 latency -40%\n\n\
             Alternatives:\n• PgBouncer"
        );
    }

    #[test]
    fn test_empty_sections_are_omitted() {
        let fix = FixProposal {
            explanation: Some("Add an index on users.email".into()),
            fixed_code: Some("   ".into()),
            ..FixProposal::default()
        };
        assert_eq!(
            format_fix_suggestion(&fix),
            "FIX SUGGESTION:\n\nExplanation:\nAdd an index on users.email"
        );
    }

    #[test]
    fn test_null_lists_keep_other_sections() {
        let fix: FixProposal = serde_json::from_str(
            r#"{"fix_steps": null, "fixed_code": "pool.get()", "explanation": "use pool", "alternatives": null}"#,
        )
        .unwrap();
        assert_eq!(
            format_fix_suggestion(&fix),
            "FIX SUGGESTION:\n\n\
             Code example:\n```\npool.get()\n```\n\n\
             Explanation:\nuse pool"
        );
    }

    #[test]
    fn test_formatting_is_deterministic() {
        let fix = FixProposal {
            fix_steps: vec!["a".into()],
            alternatives: vec!["b".into(), "c".into()],
            ..FixProposal::default()
        };
        assert_eq!(format_fix_suggestion(&fix), format_fix_suggestion(&fix));
    }
}
