//! Project intake and reporting
//!
//! Front-ends (the CLI here) drive projects through this service: size a
//! project, upload its files, and read the outcome. Uploading the last
//! expected file hands the project to the background queue.

use crate::classify::FileType;
use crate::pipeline::{LifecycleController, PipelineSettings, ProcessingQueue};
use crate::project::{
    CorrelationData, Issue, IssueId, IssueKind, Project, ProjectId, ProjectStatus, Severity,
    SourceFile,
};
use crate::reasoning::ReasoningService;
use crate::store::{Store, StoreError};
use crate::util::{check_content_size, sanitize_filename};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("project {0} not found")]
    NotFound(ProjectId),
    #[error("project is {0} and no longer accepts uploads")]
    NotAccepting(ProjectStatus),
    #[error("{0}")]
    Validation(String),
    #[error("a file named '{0}' was already uploaded")]
    Duplicate(String),
    #[error("project expects {0} files and all have been uploaded")]
    CountExceeded(usize),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ProjectNotFound(id) => ServiceError::NotFound(id),
            StoreError::DuplicateFile(name) => ServiceError::Duplicate(name),
            StoreError::NotAccepting(status) => ServiceError::NotAccepting(status),
            StoreError::FileLimitReached(total) => ServiceError::CountExceeded(total),
            other => ServiceError::Store(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub max_upload_mb: u64,
    pub pipeline: PipelineSettings,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_upload_mb: 10,
            pipeline: PipelineSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub file_name: String,
    pub files_uploaded: usize,
    pub total_files: usize,
    pub processing_started: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total_files_analyzed: usize,
    pub total_issues: usize,
    pub confirmed_issues: usize,
    pub potential_issues: usize,
    pub completed_at: DateTime<Utc>,
}

/// Issue as presented to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueView {
    pub id: IssueId,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub category: String,
    pub file_name: Option<String>,
    pub line_number: Option<u32>,
    pub code_snippet: String,
    pub fix_suggestion: Option<String>,
    pub correlation: CorrelationData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProjectReport {
    Initializing {
        files_uploaded: usize,
        total_files: usize,
    },
    Processing {
        files_processed: usize,
        total_files: usize,
        percentage: f64,
    },
    Failed {
        message: String,
    },
    Completed {
        statistics: Statistics,
        confirmed_issues: Vec<IssueView>,
        potential_issues: Vec<IssueView>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub id: ProjectId,
    pub status: ProjectStatus,
    pub total_files: usize,
    pub files_processed: usize,
    pub created_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl From<&Project> for ProjectSummary {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id,
            status: project.status,
            total_files: project.total_files,
            files_processed: project.files_processed,
            created_at: project.created_at,
            error_message: project.error_message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub reasoning_service_configured: bool,
    pub timestamp: DateTime<Utc>,
}

pub struct ProjectService {
    store: Arc<dyn Store>,
    reasoner: Arc<dyn ReasoningService>,
    queue: ProcessingQueue,
    max_upload_mb: u64,
}

impl ProjectService {
    pub fn new(
        store: Arc<dyn Store>,
        reasoner: Arc<dyn ReasoningService>,
        settings: ServiceSettings,
    ) -> Self {
        let controller =
            LifecycleController::new(store.clone(), reasoner.clone(), settings.pipeline);
        Self {
            store,
            reasoner,
            queue: ProcessingQueue::new(controller),
            max_upload_mb: settings.max_upload_mb,
        }
    }

    pub fn initialize(&self, file_count: usize) -> Result<Project, ServiceError> {
        if file_count == 0 {
            return Err(ServiceError::Validation(
                "file_count must be a positive integer".to_string(),
            ));
        }
        let project = self.store.create_project(file_count)?;
        tracing::info!(project_id = %project.id, file_count, "project initialized");
        Ok(project)
    }

    /// Store one file. Uploading the last expected file starts processing,
    /// so this must be called from within a tokio runtime.
    pub fn upload_file(
        &self,
        project_id: ProjectId,
        file_name: &str,
        content: String,
        file_type: Option<&str>,
    ) -> Result<UploadReceipt, ServiceError> {
        let project = self.store.project(project_id)?;
        if !matches!(
            project.status,
            ProjectStatus::Initializing | ProjectStatus::Processing
        ) {
            return Err(ServiceError::NotAccepting(project.status));
        }

        if file_name.trim().is_empty() {
            return Err(ServiceError::Validation("file name is required".to_string()));
        }
        if content.is_empty() {
            return Err(ServiceError::Validation(format!(
                "file '{}' is empty",
                file_name
            )));
        }
        check_content_size(&content, self.max_upload_mb).map_err(ServiceError::Validation)?;

        let name = sanitize_filename(file_name);
        let mut file = SourceFile::new(project_id, name.clone(), content);
        if let Some(file_type) = file_type.and_then(FileType::from_tag) {
            file = file.with_file_type(file_type);
        }
        let stored = self.store.accept_upload(file)?;

        let files_uploaded = stored.files_uploaded;
        let processing_started =
            files_uploaded == stored.total_files && self.queue.start_processing(project_id);
        tracing::info!(
            %project_id,
            file = %name,
            files_uploaded,
            total = stored.total_files,
            "file uploaded"
        );

        Ok(UploadReceipt {
            file_name: name,
            files_uploaded,
            total_files: stored.total_files,
            processing_started,
        })
    }

    /// Explicitly (re)start processing, e.g. after a restart left a project
    /// in `Processing`.
    pub fn start_processing(&self, project_id: ProjectId) -> Result<bool, ServiceError> {
        self.store.project(project_id)?;
        Ok(self.queue.start_processing(project_id))
    }

    /// Wait for the background run of a project, if one was started.
    pub async fn wait_for(&self, project_id: ProjectId) {
        self.queue.wait(project_id).await;
    }

    pub fn results(&self, project_id: ProjectId) -> Result<ProjectReport, ServiceError> {
        let project = self.store.project(project_id)?;
        let report = match project.status {
            ProjectStatus::Initializing => ProjectReport::Initializing {
                files_uploaded: self.store.files(project_id)?.len(),
                total_files: project.total_files,
            },
            ProjectStatus::Processing => ProjectReport::Processing {
                files_processed: project.files_processed,
                total_files: project.total_files,
                percentage: project.progress_percentage(),
            },
            ProjectStatus::Failed => ProjectReport::Failed {
                message: project
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "processing failed".to_string()),
            },
            ProjectStatus::Completed => self.completed_report(&project)?,
        };
        Ok(report)
    }

    fn completed_report(&self, project: &Project) -> Result<ProjectReport, ServiceError> {
        let file_names: HashMap<_, _> = self
            .store
            .files(project.id)?
            .into_iter()
            .map(|f| (f.id, f.name))
            .collect();
        let files_analyzed = file_names.len();
        let issues = self.store.issues(project.id, None)?;

        let view = |issue: &Issue| IssueView {
            id: issue.id,
            title: issue.title.clone(),
            description: issue.description.clone(),
            severity: issue.severity,
            category: issue.category.clone(),
            file_name: issue.file_id.and_then(|id| file_names.get(&id).cloned()),
            line_number: issue.line_number,
            code_snippet: issue.code_snippet.clone(),
            fix_suggestion: issue.fix_suggestion.clone(),
            correlation: issue.correlation.clone(),
        };

        let (confirmed, potential): (Vec<&Issue>, Vec<&Issue>) = issues
            .iter()
            .partition(|issue| issue.kind == IssueKind::Confirmed);

        Ok(ProjectReport::Completed {
            statistics: Statistics {
                total_files_analyzed: files_analyzed,
                total_issues: issues.len(),
                confirmed_issues: confirmed.len(),
                potential_issues: potential.len(),
                completed_at: project.updated_at,
            },
            confirmed_issues: confirmed.into_iter().map(view).collect(),
            potential_issues: potential.into_iter().map(view).collect(),
        })
    }

    /// All projects, newest first.
    pub fn list_projects(&self) -> Result<Vec<ProjectSummary>, ServiceError> {
        let mut projects = self.store.list_projects()?;
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects.iter().map(ProjectSummary::from).collect())
    }

    pub fn health(&self) -> Health {
        Health {
            status: "healthy",
            reasoning_service_configured: self.reasoner.is_available(),
            timestamp: Utc::now(),
        }
    }
}
