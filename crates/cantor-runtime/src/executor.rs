//! Stage execution.
//!
//! A [`StageExecutor`] turns the current [`ExecutionState`] into a prompt,
//! invokes the stage's models through the [`ModelGateway`] and converts
//! the structured result into a [`StageUpdate`]. It never mutates state.
//!
//! Errors never escape [`StageExecutor::execute`]: any failure becomes a
//! `Failed` status plus one more attempt on the stage's review family, so
//! the attempt counter advances even when every call fails.

use cantor_core::{
    ExecutionState, OutputSchema, ReviewFamily, ReviewNormalization, ReviewOutput, ReviewStatus,
    ReviewVerdict, Stage, StageUpdate, StructuredOutput, UsageEntry,
};
use std::sync::Arc;
use thiserror::Error;

use crate::gateway::{GatewayError, Invocation, ModelGateway, Prompt};
use crate::prompts::PromptTemplates;

/// Why a stage produced no usable output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("expected {expected} output, got {got}")]
    SchemaMismatch {
        expected: OutputSchema,
        got: OutputSchema,
    },

    #[error("no models configured for cycle {cycle} stage {stage}")]
    MissingModels { cycle: u32, stage: Stage },
}

/// Runs single stages against the model gateway.
#[derive(Clone)]
pub struct StageExecutor {
    gateway: ModelGateway,
    templates: Arc<dyn PromptTemplates>,
    normalization: ReviewNormalization,
}

impl StageExecutor {
    pub fn new(gateway: ModelGateway, templates: Arc<dyn PromptTemplates>) -> Self {
        Self {
            gateway,
            templates,
            normalization: ReviewNormalization::default(),
        }
    }

    pub fn with_normalization(mut self, normalization: ReviewNormalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.gateway
    }

    /// Execute `state.stage`, absorbing any failure into the update.
    pub async fn execute(&self, state: &ExecutionState) -> StageUpdate {
        let stage = state.stage;
        let result = match stage {
            Stage::Compose => self.compose(state).await,
            Stage::LegalReview => self.legal_review(state).await,
            Stage::LegalAdjust => self.legal_adjust(state).await,
            Stage::LinguisticReview => self.linguistic_review(state).await,
            Stage::LinguisticAdjust => self.linguistic_adjust(state).await,
            Stage::Terminal => return StageUpdate::default(),
        };

        match result {
            Ok(update) => update,
            Err(error) => Self::failure(state, stage, &error),
        }
    }

    pub async fn compose(&self, state: &ExecutionState) -> Result<StageUpdate, StageError> {
        let prompt = self.templates.compose(state);
        let invocation = self.invoke(state, Stage::Compose, &prompt, OutputSchema::Draft).await?;
        let usage = usage_entry(state, Stage::Compose, &invocation);
        let text = expect_draft(invocation.output)?;

        Ok(StageUpdate {
            draft: Some(text),
            previous_draft: (!state.draft.is_empty()).then(|| state.draft.clone()),
            ..Default::default()
        }
        .with_usage(usage))
    }

    pub async fn legal_review(&self, state: &ExecutionState) -> Result<StageUpdate, StageError> {
        let prompt = self.templates.legal_review(state);
        self.review(state, Stage::LegalReview, ReviewFamily::Legal, &prompt)
            .await
    }

    pub async fn legal_adjust(&self, state: &ExecutionState) -> Result<StageUpdate, StageError> {
        let prompt = self.templates.legal_adjust(state);
        self.adjust(state, Stage::LegalAdjust, ReviewFamily::Legal, &prompt)
            .await
    }

    pub async fn linguistic_review(&self, state: &ExecutionState) -> Result<StageUpdate, StageError> {
        let prompt = self.templates.linguistic_review(state);
        self.review(state, Stage::LinguisticReview, ReviewFamily::Linguistic, &prompt)
            .await
    }

    pub async fn linguistic_adjust(&self, state: &ExecutionState) -> Result<StageUpdate, StageError> {
        let prompt = self.templates.linguistic_adjust(state);
        self.adjust(state, Stage::LinguisticAdjust, ReviewFamily::Linguistic, &prompt)
            .await
    }

    async fn review(
        &self,
        state: &ExecutionState,
        stage: Stage,
        family: ReviewFamily,
        prompt: &Prompt,
    ) -> Result<StageUpdate, StageError> {
        let invocation = self.invoke(state, stage, prompt, OutputSchema::Review).await?;
        let usage = usage_entry(state, stage, &invocation);
        let review = expect_review(invocation.output)?;

        let original = review.status;
        let (review, changed) = review.normalize(self.normalization);
        if changed {
            tracing::debug!(
                cycle = state.cycle_index,
                %stage,
                from = ?original,
                to = ?review.status,
                issues = review.issues.len(),
                "Review verdict normalized"
            );
        }

        let attempts = state.attempts(family);
        let (status, attempts) = match review.status {
            ReviewVerdict::Approved => (ReviewStatus::Approved, attempts),
            ReviewVerdict::Rejected => (ReviewStatus::Rejected, attempts + 1),
        };

        Ok(StageUpdate::default()
            .with_status(family, status)
            .with_issues(family, review.issues)
            .with_attempts(family, attempts)
            .with_usage(usage))
    }

    async fn adjust(
        &self,
        state: &ExecutionState,
        stage: Stage,
        family: ReviewFamily,
        prompt: &Prompt,
    ) -> Result<StageUpdate, StageError> {
        let invocation = self.invoke(state, stage, prompt, OutputSchema::Draft).await?;
        let usage = usage_entry(state, stage, &invocation);
        let text = expect_draft(invocation.output)?;

        Ok(StageUpdate {
            draft: Some(text),
            previous_draft: Some(state.draft.clone()),
            ..Default::default()
        }
        .with_status(family, ReviewStatus::Pending)
        .with_usage(usage))
    }

    async fn invoke(
        &self,
        state: &ExecutionState,
        stage: Stage,
        prompt: &Prompt,
        schema: OutputSchema,
    ) -> Result<Invocation, StageError> {
        let models = state
            .cycle_config
            .stage_models(state.cycle_index, stage)
            .ok_or(StageError::MissingModels {
                cycle: state.cycle_index,
                stage,
            })?;

        Ok(self.gateway.invoke(models, prompt, schema).await?)
    }

    fn failure(state: &ExecutionState, stage: Stage, error: &StageError) -> StageUpdate {
        let Some(family) = stage.family() else {
            return StageUpdate::default();
        };

        tracing::error!(
            cycle = state.cycle_index,
            %stage,
            %family,
            error = %error,
            "Stage failed, continuing"
        );

        StageUpdate::default()
            .with_status(family, ReviewStatus::Failed)
            .with_attempts(family, state.attempts(family) + 1)
    }
}

fn usage_entry(state: &ExecutionState, stage: Stage, invocation: &Invocation) -> UsageEntry {
    UsageEntry {
        cycle: state.cycle_index,
        stage,
        model_used: invocation.model_used.clone(),
        used_fallback: invocation.used_fallback,
    }
}

fn expect_draft(output: StructuredOutput) -> Result<String, StageError> {
    match output {
        StructuredOutput::Draft(draft) => Ok(draft.text),
        other => Err(StageError::SchemaMismatch {
            expected: OutputSchema::Draft,
            got: other.schema(),
        }),
    }
}

fn expect_review(output: StructuredOutput) -> Result<ReviewOutput, StageError> {
    match output {
        StructuredOutput::Review(review) => Ok(review),
        other => Err(StageError::SchemaMismatch {
            expected: OutputSchema::Review,
            got: other.schema(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::PlainTemplates;
    use crate::providers::{ModelClient, ModelRequest, ProviderError};
    use crate::resilience::AdaptiveThrottler;
    use async_trait::async_trait;
    use cantor_core::{CycleConfig, CycleModels, ParsedDocument, ProviderRegistry, StageModels};

    /// Returns the same answer for every call.
    struct FixedClient(Result<StructuredOutput, ProviderError>);

    #[async_trait]
    impl ModelClient for FixedClient {
        async fn call_model(&self, _request: &ModelRequest) -> Result<StructuredOutput, ProviderError> {
            self.0.clone()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn executor(answer: Result<StructuredOutput, ProviderError>) -> StageExecutor {
        let gateway = ModelGateway::new(
            Arc::new(FixedClient(answer)),
            Arc::new(AdaptiveThrottler::default()),
            ProviderRegistry::default(),
        );
        StageExecutor::new(gateway, Arc::new(PlainTemplates))
    }

    fn state(stage: Stage) -> ExecutionState {
        let models = CycleModels::uniform(StageModels::new("gpt-4o", "claude-sonnet-4-5"));
        let mut state = ExecutionState::initial(
            ParsedDocument::new("Civil law", "Contracts", "body"),
            "samba",
            CycleConfig::repeat(models, 1),
        );
        state.stage = stage;
        state.draft = "old draft".to_string();
        state
    }

    fn review(status: ReviewVerdict, issues: &[&str]) -> StructuredOutput {
        StructuredOutput::Review(ReviewOutput {
            status,
            issues: issues.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[tokio::test]
    async fn test_approved_with_issues_normalized_to_rejected() {
        let exec = executor(Ok(review(ReviewVerdict::Approved, &["x"])));
        let update = exec.execute(&state(Stage::LegalReview)).await;

        assert_eq!(update.legal_status, Some(ReviewStatus::Rejected));
        assert_eq!(update.legal_issues, Some(vec!["x".to_string()]));
        assert_eq!(update.legal_attempts, Some(1));
    }

    #[tokio::test]
    async fn test_approval_keeps_attempts() {
        let exec = executor(Ok(review(ReviewVerdict::Approved, &[])));
        let mut s = state(Stage::LinguisticReview);
        s.linguistic_attempts = 2;
        let update = exec.execute(&s).await;

        assert_eq!(update.linguistic_status, Some(ReviewStatus::Approved));
        assert_eq!(update.linguistic_attempts, Some(2));
        assert_eq!(update.linguistic_issues, Some(vec![]));
        assert!(update.legal_status.is_none());

        let usage = update.usage.unwrap();
        assert_eq!(usage.stage, Stage::LinguisticReview);
        assert_eq!(usage.model_used, "gpt-4o");
        assert!(!usage.used_fallback);
    }

    #[tokio::test]
    async fn test_symmetric_normalization_is_opt_in() {
        let answer = Ok(review(ReviewVerdict::Rejected, &[]));

        let update = executor(answer.clone())
            .execute(&state(Stage::LegalReview))
            .await;
        assert_eq!(update.legal_status, Some(ReviewStatus::Rejected));

        let update = executor(answer)
            .with_normalization(ReviewNormalization {
                approve_rejected_without_issues: true,
            })
            .execute(&state(Stage::LegalReview))
            .await;
        assert_eq!(update.legal_status, Some(ReviewStatus::Approved));
        assert_eq!(update.legal_attempts, Some(0));
    }

    #[tokio::test]
    async fn test_compose_records_previous_draft() {
        let exec = executor(Ok(StructuredOutput::draft("new draft")));
        let update = exec.execute(&state(Stage::Compose)).await;
        assert_eq!(update.draft.as_deref(), Some("new draft"));
        assert_eq!(update.previous_draft.as_deref(), Some("old draft"));

        let mut fresh = state(Stage::Compose);
        fresh.draft.clear();
        let update = exec.execute(&fresh).await;
        assert!(update.previous_draft.is_none());
    }

    #[tokio::test]
    async fn test_adjust_resets_status_to_pending() {
        let exec = executor(Ok(StructuredOutput::draft("fixed draft")));
        let mut s = state(Stage::LegalAdjust);
        s.legal_status = ReviewStatus::Rejected;
        s.legal_attempts = 1;
        let update = exec.execute(&s).await;

        assert_eq!(update.draft.as_deref(), Some("fixed draft"));
        assert_eq!(update.previous_draft.as_deref(), Some("old draft"));
        assert_eq!(update.legal_status, Some(ReviewStatus::Pending));
        assert!(update.legal_attempts.is_none());
    }

    #[tokio::test]
    async fn test_gateway_failure_becomes_failed_status() {
        let exec = executor(Err(ProviderError::Auth));
        let mut s = state(Stage::LinguisticAdjust);
        s.linguistic_attempts = 3;
        let update = exec.execute(&s).await;

        assert_eq!(update.linguistic_status, Some(ReviewStatus::Failed));
        assert_eq!(update.linguistic_attempts, Some(4));
        assert!(update.draft.is_none());
        assert!(update.usage.is_none());
    }

    #[tokio::test]
    async fn test_compose_failure_charged_to_legal() {
        let exec = executor(Err(ProviderError::Timeout(std::time::Duration::from_secs(1))));
        let update = exec.execute(&state(Stage::Compose)).await;
        assert_eq!(update.legal_status, Some(ReviewStatus::Failed));
        assert_eq!(update.legal_attempts, Some(1));
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_failure() {
        let exec = executor(Ok(StructuredOutput::draft("not a review")));
        let result = exec.legal_review(&state(Stage::LegalReview)).await;
        assert_eq!(
            result.unwrap_err(),
            StageError::SchemaMismatch {
                expected: OutputSchema::Review,
                got: OutputSchema::Draft,
            }
        );
    }

    #[tokio::test]
    async fn test_missing_models_is_failure() {
        let exec = executor(Ok(StructuredOutput::draft("unused")));
        let mut s = state(Stage::Compose);
        s.cycle_config = CycleConfig::new(vec![]);
        let update = exec.execute(&s).await;
        assert_eq!(update.legal_status, Some(ReviewStatus::Failed));
    }

    #[tokio::test]
    async fn test_terminal_is_noop() {
        let exec = executor(Err(ProviderError::Auth));
        assert_eq!(exec.execute(&state(Stage::Terminal)).await, StageUpdate::default());
    }
}
