//! Domain entities for an analysis project
//!
//! A [`Project`] owns its uploaded [`SourceFile`]s and the [`Issue`]s found in
//! them. Entities are append-mostly: nothing is deleted during processing, and
//! potential issues that feed a confirmed issue only gain a back-reference.

use crate::classify::FileType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type ProjectId = Uuid;
pub type FileId = Uuid;
pub type IssueId = Uuid;

/// Lifecycle of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Created, waiting for the first upload
    Initializing,
    /// Accepting uploads or running the pipeline
    Processing,
    Completed,
    Failed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Initializing => "initializing",
            ProjectStatus::Processing => "processing",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Failed => "failed",
        }
    }

    /// `Completed` and `Failed` never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Failed)
    }

    /// Forward-only transitions. `Processing -> Processing` is allowed so the
    /// controller can restart the counter after uploads already moved the
    /// project out of `Initializing`.
    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;
        match (*self, next) {
            (Initializing, Processing) | (Processing, Processing) => true,
            (Processing, Completed) => true,
            (Initializing, Failed) | (Processing, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot move project from {from} to {to}")]
pub struct TransitionError {
    pub from: ProjectStatus,
    pub to: ProjectStatus,
}

/// Aggregate root for one batch of uploaded files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub total_files: usize,
    pub files_processed: usize,
    pub status: ProjectStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(total_files: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            total_files,
            files_processed: 0,
            status: ProjectStatus::Initializing,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, next: ProjectStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Enter `Processing` and restart the progress counter.
    pub fn begin_processing(&mut self) -> Result<(), TransitionError> {
        self.transition(ProjectStatus::Processing)?;
        self.files_processed = 0;
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.transition(ProjectStatus::Completed)
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(ProjectStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    /// Bump the progress counter, never past `total_files`.
    pub fn record_file_processed(&mut self) {
        if self.files_processed < self.total_files {
            self.files_processed += 1;
            self.touch();
        }
    }

    /// Progress in percent, rounded to two decimals.
    pub fn progress_percentage(&self) -> f64 {
        if self.total_files == 0 {
            return 0.0;
        }
        let pct = self.files_processed as f64 / self.total_files as f64 * 100.0;
        (pct * 100.0).round() / 100.0
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// One uploaded file. Content never changes after upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub id: FileId,
    pub project_id: ProjectId,
    pub name: String,
    pub content: String,
    pub file_type: Option<FileType>,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

impl SourceFile {
    pub fn new(project_id: ProjectId, name: String, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            name,
            content,
            file_type: None,
            processed: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_file_type(mut self, file_type: FileType) -> Self {
        self.file_type = Some(file_type);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Found inside a single file
    Potential,
    /// Synthesized from two correlated potential issues in different files
    Confirmed,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parse a service-supplied severity; anything unrecognised is `Medium`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low" | "minor" => Severity::Low,
            "high" | "major" => Severity::High,
            "critical" | "blocker" => Severity::Critical,
            _ => Severity::Medium,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlation side-channel attached to every issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CorrelationData {
    /// Hints reported by the analysis of a single file
    Potential { keywords: Vec<String>, confidence: f64 },
    /// Provenance of a confirmed issue
    Confirmed {
        source_issue_ids: [IssueId; 2],
        confidence: f64,
        file_names: [String; 2],
    },
    /// A potential issue that contributed to one or more confirmed issues.
    /// The original hints are kept alongside the back-references.
    BackRef {
        confirmed_issue_ids: Vec<IssueId>,
        keywords: Vec<String>,
        confidence: f64,
    },
}

impl CorrelationData {
    pub fn keywords(&self) -> &[String] {
        match self {
            CorrelationData::Potential { keywords, .. }
            | CorrelationData::BackRef { keywords, .. } => keywords,
            CorrelationData::Confirmed { .. } => &[],
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            CorrelationData::Potential { confidence, .. }
            | CorrelationData::Confirmed { confidence, .. }
            | CorrelationData::BackRef { confidence, .. } => *confidence,
        }
    }

    pub fn confirmed_issue_ids(&self) -> &[IssueId] {
        match self {
            CorrelationData::BackRef {
                confirmed_issue_ids,
                ..
            } => confirmed_issue_ids,
            _ => &[],
        }
    }

    /// Record that this potential issue feeds `confirmed_id`.
    /// Confirmed issues never carry back-references.
    pub fn attach_back_ref(&mut self, confirmed_id: IssueId) {
        match self {
            CorrelationData::Potential {
                keywords,
                confidence,
            } => {
                *self = CorrelationData::BackRef {
                    confirmed_issue_ids: vec![confirmed_id],
                    keywords: std::mem::take(keywords),
                    confidence: *confidence,
                };
            }
            CorrelationData::BackRef {
                confirmed_issue_ids,
                ..
            } => {
                if !confirmed_issue_ids.contains(&confirmed_id) {
                    confirmed_issue_ids.push(confirmed_id);
                }
            }
            CorrelationData::Confirmed { .. } => {}
        }
    }
}

/// A performance issue, either potential or confirmed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub project_id: ProjectId,
    /// `None` for cross-file confirmed issues
    pub file_id: Option<FileId>,
    pub kind: IssueKind,
    pub title: String,
    pub description: String,
    pub line_number: Option<u32>,
    #[serde(default)]
    pub code_snippet: String,
    pub severity: Severity,
    pub category: String,
    pub fix_suggestion: Option<String>,
    pub correlation: CorrelationData,
    pub created_at: DateTime<Utc>,
}

impl Issue {
    pub fn is_potential(&self) -> bool {
        self.kind == IssueKind::Potential
    }

    pub fn needs_fix_suggestion(&self) -> bool {
        self.fix_suggestion.is_none()
    }
}
