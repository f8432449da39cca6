use super::{correlate, extract, generate_suggestions, PipelineSettings, StepContext};
use crate::project::{ProjectId, ProjectStatus};
use crate::reasoning::ReasoningService;
use crate::store::{LifecycleUpdate, Store};
use anyhow::Context;
use std::sync::Arc;

/// What one run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RunSummary {
    files: usize,
    potential_issues: usize,
    confirmed_issues: usize,
    suggestions: usize,
}

/// Drives one project from `Processing` to a terminal state.
#[derive(Clone)]
pub struct LifecycleController {
    store: Arc<dyn Store>,
    reasoner: Arc<dyn ReasoningService>,
    settings: PipelineSettings,
}

impl LifecycleController {
    pub fn new(
        store: Arc<dyn Store>,
        reasoner: Arc<dyn ReasoningService>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            reasoner,
            settings,
        }
    }

    fn context(&self) -> StepContext<'_> {
        StepContext {
            store: self.store.as_ref(),
            reasoner: self.reasoner.as_ref(),
            settings: &self.settings,
        }
    }

    /// Run the whole pipeline for `project_id`. Outcomes are only visible
    /// through the project's status and its issues.
    pub async fn run(&self, project_id: ProjectId) {
        let project = match self.store.project(project_id) {
            Ok(project) => project,
            Err(err) => {
                tracing::error!(%project_id, "cannot start processing: {}", err);
                return;
            }
        };
        if project.status.is_terminal() {
            tracing::info!(%project_id, status = %project.status, "project already finished, skipping");
            return;
        }

        match self.run_sequence(project_id).await {
            Ok(summary) => tracing::info!(
                %project_id,
                files = summary.files,
                potential = summary.potential_issues,
                confirmed = summary.confirmed_issues,
                suggestions = summary.suggestions,
                "project completed"
            ),
            Err(err) => {
                tracing::error!(%project_id, "processing failed: {:#}", err);
                self.mark_failed(project_id, format!("{:#}", err));
            }
        }
    }

    async fn run_sequence(&self, project_id: ProjectId) -> anyhow::Result<RunSummary> {
        let ctx = self.context();

        ctx.store
            .update_lifecycle(project_id, LifecycleUpdate::BeginProcessing)
            .context("Failed to enter processing")?;

        let files = ctx
            .store
            .files(project_id)
            .context("Failed to list project files")?;

        let mut summary = RunSummary {
            files: files.len(),
            ..RunSummary::default()
        };

        if files.is_empty() {
            tracing::info!(%project_id, "no files uploaded, completing immediately");
            ctx.store
                .update_lifecycle(project_id, LifecycleUpdate::Complete)
                .context("Failed to mark project completed")?;
            return Ok(summary);
        }

        for file in &files {
            summary.potential_issues += extract(ctx, file).await.len();
            let progress = ctx
                .store
                .increment_files_processed(project_id)
                .context("Failed to record file progress")?;
            tracing::debug!(
                %project_id,
                processed = progress.files_processed,
                total = progress.total_files,
                "progress"
            );
        }

        match correlate(ctx, project_id).await {
            Ok(confirmed) => summary.confirmed_issues = confirmed.len(),
            Err(err) => tracing::error!(%project_id, "correlation pass not stored: {}", err),
        }

        match generate_suggestions(ctx, project_id).await {
            Ok(applied) => summary.suggestions = applied,
            Err(err) => tracing::error!(%project_id, "fix suggestions not stored: {}", err),
        }

        ctx.store
            .update_lifecycle(project_id, LifecycleUpdate::Complete)
            .context("Failed to mark project completed")?;
        Ok(summary)
    }

    /// Move the project to `Failed`, unless it already reached a terminal state.
    pub(crate) fn mark_failed(&self, project_id: ProjectId, message: String) {
        match self.store.project(project_id) {
            Ok(project) if project.status == ProjectStatus::Failed => return,
            Ok(project) if project.status == ProjectStatus::Completed => {
                tracing::warn!(%project_id, "not failing a completed project: {}", message);
                return;
            }
            _ => {}
        }
        if let Err(err) = self
            .store
            .update_lifecycle(project_id, LifecycleUpdate::Fail(message))
        {
            tracing::error!(%project_id, "could not record failure: {}", err);
        }
    }
}
