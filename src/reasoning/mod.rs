//! Reasoning-service collaborator
//!
//! The pipeline only talks to [`ReasoningService`]. Every operation returns a
//! well-formed result or a [`ReasoningError`]; callers decide how far a
//! failure propagates (for the pipeline: never past one file, pair or issue).

pub mod client;
pub mod llm;
pub mod parse;
pub mod prompts;

#[cfg(test)]
pub(crate) mod fake;

pub use client::ChatClient;
pub use llm::LlmReasoner;

use crate::classify::FileType;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Models send `null` for lists they have nothing for; treat it as empty.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Result of analysing one file. Issue records are kept loosely typed; the
/// extractor validates them one at a time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(default, deserialize_with = "null_as_default")]
    pub issues: Vec<serde_json::Value>,
    /// Set when the service answered but reported it could not analyse the file
    #[serde(default)]
    pub error: Option<String>,
}

impl AnalysisReport {
    pub fn with_issues(issues: Vec<serde_json::Value>) -> Self {
        Self {
            issues,
            error: None,
        }
    }
}

/// What the service sees of an issue when judging a correlation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueBrief {
    pub title: String,
    pub description: String,
    pub category: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CorrelationVerdict {
    #[serde(default)]
    pub is_correlated: bool,
    #[serde(default)]
    pub combined_description: Option<String>,
    #[serde(default)]
    pub combined_severity: Option<String>,
    #[serde(default)]
    pub correlation_explanation: Option<String>,
    #[serde(default)]
    pub correlation_confidence: Option<f64>,
}

/// Structured remediation returned by the service
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FixProposal {
    #[serde(default, deserialize_with = "null_as_default")]
    pub fix_steps: Vec<String>,
    #[serde(default)]
    pub fixed_code: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub estimated_improvement: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub alternatives: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("no API key configured; set {0} or add api_key to the config file")]
    NotConfigured(&'static str),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Flag performance issues in a single file.
    async fn analyze(
        &self,
        file_name: &str,
        content: &str,
        file_type: FileType,
    ) -> Result<AnalysisReport, ReasoningError>;

    /// Decide whether two issues from different files share a root cause.
    async fn correlate(
        &self,
        first: &IssueBrief,
        second: &IssueBrief,
        first_content: &str,
        second_content: &str,
    ) -> Result<CorrelationVerdict, ReasoningError>;

    async fn suggest_fix(
        &self,
        title: &str,
        description: &str,
        code_snippet: &str,
        category: &str,
    ) -> Result<FixProposal, ReasoningError>;

    /// Whether the service can be reached at all (credentials present etc.)
    fn is_available(&self) -> bool {
        true
    }
}
