//! Processing pipeline
//!
//! Per project, strictly in sequence:
//! 1. [`extract`] each file into potential issues
//! 2. [`correlate`] potential issues across files into confirmed issues
//! 3. [`generate_suggestions`] for every issue still lacking one
//!
//! [`LifecycleController`] drives the sequence and owns the status
//! transitions; [`ProcessingQueue`] runs it in the background with at most one
//! run per project.

mod controller;
mod correlate;
mod extract;
mod suggest;
mod worker;


pub use controller::LifecycleController;
pub use correlate::{categories_adjacent, correlate, is_correlation_candidate};
pub use extract::{build_potential_issue, extract, RecordError};
pub use suggest::{format_fix_suggestion, generate_suggestions};
pub use worker::ProcessingQueue;

use crate::config::Config;
use crate::reasoning::{ReasoningError, ReasoningService};
use crate::store::Store;
use std::future::Future;
use std::time::Duration;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Upper bound for any single reasoning-service call
    pub call_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            call_timeout: config.request_timeout(),
        }
    }
}

/// Collaborators shared by every pipeline step
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub store: &'a dyn Store,
    pub reasoner: &'a dyn ReasoningService,
    pub settings: &'a PipelineSettings,
}

impl StepContext<'_> {
    /// Run one reasoning-service call under the configured time bound.
    pub(crate) async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ReasoningError>>,
    ) -> Result<T, ReasoningError> {
        let limit = self.settings.call_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(ReasoningError::Timeout(limit)),
        }
    }
}
