use super::client::ChatClient;
use super::parse::parse_json_object;
use super::prompts;
use super::{
    AnalysisReport, CorrelationVerdict, FixProposal, IssueBrief, ReasoningError, ReasoningService,
};
use crate::classify::FileType;
use crate::config::Config;
use crate::hints::ContentHints;
use crate::util::truncate_for_prompt;
use async_trait::async_trait;

/// Reasoning service backed by a chat-completions model.
#[derive(Debug, Clone)]
pub struct LlmReasoner {
    client: ChatClient,
    max_prompt_chars: usize,
}

impl LlmReasoner {
    pub fn from_config(config: &Config) -> Result<Self, ReasoningError> {
        Ok(Self {
            client: ChatClient::from_config(config)?,
            max_prompt_chars: config.max_prompt_chars,
        })
    }

    /// Each side of a correlation prompt gets half the budget.
    fn excerpt_budget(&self) -> usize {
        (self.max_prompt_chars / 2).max(1)
    }
}

#[async_trait]
impl ReasoningService for LlmReasoner {
    async fn analyze(
        &self,
        file_name: &str,
        content: &str,
        file_type: FileType,
    ) -> Result<AnalysisReport, ReasoningError> {
        let hints = ContentHints::collect(content, file_type);
        let excerpt = truncate_for_prompt(content, self.max_prompt_chars);
        let user = prompts::analysis_user(file_name, file_type, &excerpt, &hints);

        tracing::debug!(
            file = file_name,
            %file_type,
            model = self.client.model(),
            chars = excerpt.len(),
            "requesting analysis"
        );
        let response = self.client.complete_json(prompts::ANALYSIS_SYSTEM, &user).await?;
        parse_json_object(&response, "analysis")
    }

    async fn correlate(
        &self,
        first: &IssueBrief,
        second: &IssueBrief,
        first_content: &str,
        second_content: &str,
    ) -> Result<CorrelationVerdict, ReasoningError> {
        let budget = self.excerpt_budget();
        let user = prompts::correlation_user(
            first,
            second,
            &truncate_for_prompt(first_content, budget),
            &truncate_for_prompt(second_content, budget),
        );
        let response = self
            .client
            .complete_json(prompts::CORRELATION_SYSTEM, &user)
            .await?;
        parse_json_object(&response, "correlation")
    }

    async fn suggest_fix(
        &self,
        title: &str,
        description: &str,
        code_snippet: &str,
        category: &str,
    ) -> Result<FixProposal, ReasoningError> {
        let user = prompts::fix_user(title, description, code_snippet, category);
        let response = self.client.complete_json(prompts::FIX_SYSTEM, &user).await?;
        parse_json_object(&response, "fix suggestion")
    }

    fn is_available(&self) -> bool {
        self.client.has_api_key()
    }
}
