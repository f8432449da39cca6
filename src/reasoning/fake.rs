//! Scripted reasoning service for tests

use super::{
    AnalysisReport, CorrelationVerdict, FixProposal, IssueBrief, ReasoningError, ReasoningService,
};
use crate::classify::FileType;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Clone)]
pub(crate) enum Scripted<T> {
    Reply(T),
    Fail(String),
    /// Never completes; exercises the per-call time bound
    Hang,
}

impl<T: Clone> Scripted<T> {
    async fn play(&self) -> Result<T, ReasoningError> {
        match self {
            Scripted::Reply(value) => Ok(value.clone()),
            Scripted::Fail(message) => Err(ReasoningError::Api {
                status: 500,
                message: message.clone(),
            }),
            Scripted::Hang => std::future::pending().await,
        }
    }
}

pub(crate) struct ScriptedReasoner {
    analyses: HashMap<String, Scripted<AnalysisReport>>,
    verdict: Scripted<CorrelationVerdict>,
    fix: Scripted<FixProposal>,
    available: bool,
    pub analyze_calls: AtomicUsize,
    pub correlate_calls: AtomicUsize,
    pub fix_calls: AtomicUsize,
}

impl Default for ScriptedReasoner {
    fn default() -> Self {
        Self {
            analyses: HashMap::new(),
            verdict: Scripted::Reply(CorrelationVerdict::default()),
            fix: Scripted::Reply(FixProposal::default()),
            available: true,
            analyze_calls: AtomicUsize::new(0),
            correlate_calls: AtomicUsize::new(0),
            fix_calls: AtomicUsize::new(0),
        }
    }
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files without a script get an empty, successful report.
    pub fn analysis(mut self, file_name: &str, issues: Vec<serde_json::Value>) -> Self {
        self.analyses.insert(
            file_name.to_string(),
            Scripted::Reply(AnalysisReport::with_issues(issues)),
        );
        self
    }

    pub fn analysis_script(mut self, file_name: &str, script: Scripted<AnalysisReport>) -> Self {
        self.analyses.insert(file_name.to_string(), script);
        self
    }

    pub fn verdict(mut self, script: Scripted<CorrelationVerdict>) -> Self {
        self.verdict = script;
        self
    }

    pub fn fix(mut self, script: Scripted<FixProposal>) -> Self {
        self.fix = script;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn analyze_count(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    pub fn correlate_count(&self) -> usize {
        self.correlate_calls.load(Ordering::SeqCst)
    }

    pub fn fix_count(&self) -> usize {
        self.fix_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoner {
    async fn analyze(
        &self,
        file_name: &str,
        _content: &str,
        _file_type: FileType,
    ) -> Result<AnalysisReport, ReasoningError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        match self.analyses.get(file_name) {
            Some(script) => script.play().await,
            None => Ok(AnalysisReport::default()),
        }
    }

    async fn correlate(
        &self,
        _first: &IssueBrief,
        _second: &IssueBrief,
        _first_content: &str,
        _second_content: &str,
    ) -> Result<CorrelationVerdict, ReasoningError> {
        self.correlate_calls.fetch_add(1, Ordering::SeqCst);
        self.verdict.play().await
    }

    async fn suggest_fix(
        &self,
        _title: &str,
        _description: &str,
        _code_snippet: &str,
        _category: &str,
    ) -> Result<FixProposal, ReasoningError> {
        self.fix_calls.fetch_add(1, Ordering::SeqCst);
        self.fix.play().await
    }

    fn is_available(&self) -> bool {
        self.available
    }
}
