//! # cantor-runtime
//!
//! Async engine for the Cantor composition workflow.
//!
//! `cantor-core` decides *what* happens next; this crate makes it happen:
//!
//! - [`WorkflowEngine`] drives runs stage by stage, checkpointing after
//!   every transition and reporting progress
//! - [`StageExecutor`] builds prompts and turns model output into state
//!   updates, absorbing every failure
//! - [`ModelGateway`] calls a primary model and, once, its fallback
//! - [`AdaptiveThrottler`] caps concurrent calls per provider and adjusts
//!   the cap from recent outcomes
//!
//! Model access goes through the [`ModelClient`] trait. HTTP adapters are
//! behind the `anthropic` and `openai` features.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cantor_runtime::{FileCheckpointStore, RuntimeConfig, WorkflowEngine};
//!
//! let config = RuntimeConfig::from_file("runtime.yaml")?;
//! let engine = WorkflowEngine::builder()
//!     .client(Arc::new(config.client_router(&ClientFactoryRegistry::with_defaults())?))
//!     .checkpoints(Arc::new(FileCheckpointStore::new("checkpoints")))
//!     .config(config)
//!     .build()?;
//!
//! let final_state = engine.run("run-42", initial_state).await?;
//! if final_state.is_degraded() {
//!     // at least one review family ended in Failed
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod executor;
pub mod gateway;
pub mod progress;
pub mod prompts;
pub mod providers;
pub mod resilience;

pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore,
};
pub use config::{RuntimeConfig, RuntimeConfigError};
pub use engine::{EngineError, WorkflowEngine, WorkflowEngineBuilder};
pub use executor::{StageError, StageExecutor};
pub use gateway::{GatewayError, Invocation, ModelGateway, Prompt, DEFAULT_CALL_TIMEOUT};
pub use progress::{
    ChannelProgressSink, ProgressError, ProgressEvent, ProgressKind, ProgressSink,
    TracingProgressSink,
};
pub use prompts::{PlainTemplates, PromptTemplates};
pub use providers::{ClientFactoryRegistry, ClientRouter, ModelClient, ModelRequest, ProviderError};
pub use resilience::{AdaptiveThrottler, ProviderStats, ThrottleConfig};
