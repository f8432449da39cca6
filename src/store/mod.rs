//! Storage seam for projects, files and issues
//!
//! Every method is one atomic step: it either applies completely or leaves
//! the store untouched. The pipeline relies on this to keep a failed step
//! from corrupting earlier ones.

mod local;

pub use local::LocalStore;

use crate::classify::FileType;
use crate::project::{
    FileId, Issue, IssueId, IssueKind, Project, ProjectId, ProjectStatus, SourceFile,
    TransitionError,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),
    #[error("file {0} not found")]
    FileNotFound(FileId),
    #[error("issue {0} not found")]
    IssueNotFound(IssueId),
    #[error("a file named '{0}' already exists in this project")]
    DuplicateFile(String),
    #[error("project is {0} and no longer accepts uploads")]
    NotAccepting(ProjectStatus),
    #[error("project expects {0} files and all have been uploaded")]
    FileLimitReached(usize),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store snapshot could not be encoded or decoded: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("timed out waiting for the store lock ({0}s)")]
    LockTimeout(u64),
    #[error("unsupported store format version {0}")]
    UnsupportedVersion(u32),
}

/// Lifecycle changes a caller may request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleUpdate {
    /// Enter `Processing` and reset the progress counter
    BeginProcessing,
    Complete,
    Fail(String),
}

/// Outcome of [`Store::accept_upload`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredUpload {
    pub file_id: FileId,
    /// Files in the project, this one included
    pub files_uploaded: usize,
    pub total_files: usize,
}

pub trait Store: Send + Sync {
    fn create_project(&self, total_files: usize) -> Result<Project, StoreError>;

    fn project(&self, id: ProjectId) -> Result<Project, StoreError>;

    fn list_projects(&self) -> Result<Vec<Project>, StoreError>;

    fn update_lifecycle(
        &self,
        id: ProjectId,
        update: LifecycleUpdate,
    ) -> Result<Project, StoreError>;

    /// Store a new file. Names are unique within a project.
    fn add_file(&self, file: SourceFile) -> Result<SourceFile, StoreError>;

    /// Store an uploaded file. The project must still accept uploads, the
    /// name must be free and the declared file count not yet reached. The
    /// first upload moves the project into `Processing`.
    fn accept_upload(&self, file: SourceFile) -> Result<StoredUpload, StoreError>;

    /// Files of a project in upload order.
    fn files(&self, project_id: ProjectId) -> Result<Vec<SourceFile>, StoreError>;

    /// Issues of a project in creation order, optionally narrowed to one kind.
    fn issues(
        &self,
        project_id: ProjectId,
        kind: Option<IssueKind>,
    ) -> Result<Vec<Issue>, StoreError>;

    /// Insert one file's issues, record its type and mark it processed.
    fn commit_extraction(
        &self,
        file_id: FileId,
        file_type: FileType,
        issues: Vec<Issue>,
    ) -> Result<(), StoreError>;

    /// Insert confirmed issues and attach back-references to their sources.
    /// `back_refs` pairs a source issue with the confirmed issue it fed.
    fn commit_correlation(
        &self,
        project_id: ProjectId,
        confirmed: Vec<Issue>,
        back_refs: Vec<(IssueId, IssueId)>,
    ) -> Result<(), StoreError>;

    /// Set suggestions on issues that still lack one. Returns how many were
    /// applied; issues that gained a suggestion in the meantime are left alone.
    fn commit_fix_suggestions(
        &self,
        project_id: ProjectId,
        suggestions: Vec<(IssueId, String)>,
    ) -> Result<usize, StoreError>;

    /// Saturates at `total_files`.
    fn increment_files_processed(&self, project_id: ProjectId) -> Result<Project, StoreError>;
}
