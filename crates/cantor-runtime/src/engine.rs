//! The review-cycle workflow engine.
//!
//! A run executes one stage at a time: execute, merge the update, pick the
//! next stage, checkpoint, report. Stage failures are absorbed into the
//! state by the [`StageExecutor`], so a run always reaches `Terminal`.
//! The only hard failures are bad input states and missing checkpoints.
//!
//! # Architecture
//! - Sequential within a run: no stage starts before the previous one is
//!   merged and checkpointed
//! - Concurrent across runs: [`WorkflowEngine::run_many`] drives several
//!   runs at once, sharing one [`AdaptiveThrottler`]
//! - Best-effort side effects: checkpoint and progress failures are logged

use cantor_core::{next_transition, ConfigError, ExecutionState};
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

use crate::checkpoint::{validate_run_id, CheckpointError, CheckpointStore, MemoryCheckpointStore};
use crate::config::{RuntimeConfig, RuntimeConfigError};
use crate::executor::StageExecutor;
use crate::gateway::ModelGateway;
use crate::progress::{ProgressEvent, ProgressKind, ProgressSink, TracingProgressSink};
use crate::prompts::{PlainTemplates, PromptTemplates};
use crate::providers::ModelClient;
use crate::resilience::AdaptiveThrottler;

/// Hard failures of `run` and `resume`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid cycle configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Invalid execution state: {0}")]
    InvalidState(String),

    #[error("No checkpoint for run '{0}'")]
    CheckpointNotFound(String),

    #[error("Failed to load checkpoint: {0}")]
    CheckpointLoad(#[source] CheckpointError),

    #[error("Invalid runtime configuration: {0}")]
    RuntimeConfig(#[from] RuntimeConfigError),

    #[error("Engine not configured: {0}")]
    NotConfigured(String),
}

/// Drives runs from their initial state to `Terminal`.
pub struct WorkflowEngine {
    executor: StageExecutor,
    checkpoints: Arc<dyn CheckpointStore>,
    progress: Arc<dyn ProgressSink>,
}

impl WorkflowEngine {
    pub fn builder() -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::new()
    }

    pub fn new(
        executor: StageExecutor,
        checkpoints: Arc<dyn CheckpointStore>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            executor,
            checkpoints,
            progress,
        }
    }

    pub fn throttler(&self) -> &Arc<AdaptiveThrottler> {
        self.executor.gateway().throttler()
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    /// Drive a new run to completion.
    ///
    /// The initial state is checkpointed before the first stage, so a run
    /// can be resumed even if it is interrupted during Compose.
    pub async fn run(
        &self,
        run_id: &str,
        initial: ExecutionState,
    ) -> Result<ExecutionState, EngineError> {
        Self::check(run_id, &initial)?;
        self.save(run_id, &initial).await;
        Ok(self.drive(run_id, initial, false).await)
    }

    /// Continue a run from its last checkpoint.
    ///
    /// Resuming a finished run returns its final state without calling
    /// any model.
    pub async fn resume(&self, run_id: &str) -> Result<ExecutionState, EngineError> {
        validate_run_id(run_id).map_err(|e| EngineError::InvalidState(e.to_string()))?;
        let checkpoint = self
            .checkpoints
            .load(run_id)
            .await
            .map_err(EngineError::CheckpointLoad)?
            .ok_or_else(|| EngineError::CheckpointNotFound(run_id.to_string()))?;

        Self::check(run_id, &checkpoint.state)?;
        tracing::info!(
            run_id,
            cycle = checkpoint.state.cycle_index,
            stage = %checkpoint.state.stage,
            saved_at = %checkpoint.saved_at,
            "Resuming run from checkpoint"
        );
        Ok(self.drive(run_id, checkpoint.state, true).await)
    }

    /// Drive several runs concurrently.
    ///
    /// Results are returned in input order. One run's hard failure does
    /// not affect the others.
    pub async fn run_many(
        &self,
        runs: Vec<(String, ExecutionState)>,
    ) -> Vec<Result<ExecutionState, EngineError>> {
        join_all(
            runs.into_iter()
                .map(|(run_id, state)| async move { self.run(&run_id, state).await }),
        )
        .await
    }

    fn check(run_id: &str, state: &ExecutionState) -> Result<(), EngineError> {
        validate_run_id(run_id).map_err(|e| EngineError::InvalidState(e.to_string()))?;
        state.validate()?;
        Ok(())
    }

    async fn drive(&self, run_id: &str, mut state: ExecutionState, resumed: bool) -> ExecutionState {
        let span = tracing::info_span!("run", run_id = %run_id);

        async move {
            self.publish(
                run_id,
                ProgressKind::RunStarted {
                    total_cycles: state.total_cycles(),
                    resumed,
                },
            );

            while !state.is_terminal() {
                self.step(run_id, &mut state).await;
            }

            let summary = state.usage_summary();
            tracing::info!(
                legal_status = %state.legal_status,
                linguistic_status = %state.linguistic_status,
                model_calls = summary.total_calls,
                fallback_calls = summary.fallback_calls,
                "Run finished"
            );

            self.publish(
                run_id,
                ProgressKind::RunCompleted {
                    legal_status: state.legal_status,
                    linguistic_status: state.linguistic_status,
                    degraded: state.is_degraded(),
                },
            );
            state
        }
        .instrument(span)
        .await
    }

    /// Execute the current stage and commit its result.
    async fn step(&self, run_id: &str, state: &mut ExecutionState) {
        let cycle = state.cycle_index;
        let stage = state.stage;
        let span = tracing::info_span!("stage", cycle, stage = %stage);

        async move {
            self.publish(run_id, ProgressKind::StageStarted { cycle, stage });

            let update = self.executor.execute(state).await;
            state.apply(update);

            // Statuses of the finished stage, before a cycle advance resets them
            let legal_status = state.legal_status;
            let linguistic_status = state.linguistic_status;

            let transition = next_transition(state);
            tracing::debug!(?transition, "Stage transition");
            state.advance(transition);

            self.save(run_id, state).await;

            self.publish(
                run_id,
                ProgressKind::StageCompleted {
                    cycle,
                    stage,
                    legal_status,
                    linguistic_status,
                    progress_percent: state.progress_percent(),
                },
            );
        }
        .instrument(span)
        .await
    }

    async fn save(&self, run_id: &str, state: &ExecutionState) {
        if let Err(e) = self.checkpoints.save(run_id, state).await {
            tracing::warn!(run_id, error = %e, "Checkpoint write failed, continuing in memory");
        }
    }

    fn publish(&self, run_id: &str, kind: ProgressKind) {
        let event = ProgressEvent::new(run_id, kind);
        if let Err(e) = self.progress.publish(&event) {
            tracing::warn!(run_id, error = %e, "Progress publish failed");
        }
    }
}

/// Builder for [`WorkflowEngine`].
pub struct WorkflowEngineBuilder {
    client: Option<Arc<dyn ModelClient>>,
    config: RuntimeConfig,
    throttler: Option<Arc<AdaptiveThrottler>>,
    templates: Arc<dyn PromptTemplates>,
    checkpoints: Arc<dyn CheckpointStore>,
    progress: Arc<dyn ProgressSink>,
}

impl WorkflowEngineBuilder {
    pub fn new() -> Self {
        Self {
            client: None,
            config: RuntimeConfig::default(),
            throttler: None,
            templates: Arc::new(PlainTemplates),
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
            progress: Arc::new(TracingProgressSink),
        }
    }

    /// Set the model client. Required.
    pub fn client(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing throttler instead of building one from the config.
    pub fn throttler(mut self, throttler: Arc<AdaptiveThrottler>) -> Self {
        self.throttler = Some(throttler);
        self
    }

    pub fn templates(mut self, templates: Arc<dyn PromptTemplates>) -> Self {
        self.templates = templates;
        self
    }

    pub fn checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn build(self) -> Result<WorkflowEngine, EngineError> {
        let client = self
            .client
            .ok_or_else(|| EngineError::NotConfigured("no model client set".to_string()))?;
        self.config.validate()?;

        let throttler = match self.throttler {
            Some(throttler) => throttler,
            None => Arc::new(self.config.throttler()),
        };
        let gateway = ModelGateway::new(client, throttler, self.config.registry())
            .with_call_timeout(self.config.call_timeout);
        let executor = StageExecutor::new(gateway, self.templates)
            .with_normalization(self.config.normalization());

        Ok(WorkflowEngine::new(executor, self.checkpoints, self.progress))
    }
}

impl Default for WorkflowEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
