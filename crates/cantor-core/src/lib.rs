//! # cantor-core
//!
//! Deterministic core of the Cantor composition workflow.
//!
//! A run turns a parsed source document into a song draft through a fixed
//! sequence of stages, repeated for up to three cycles:
//!
//! 1. **Compose** a draft in the configured style
//! 2. **Legal review**, adjusting and re-reviewing until approved
//! 3. **Linguistic review**, adjusting and re-reviewing until approved
//!
//! This crate holds the data model and the transition rules. It makes no
//! model calls and performs no I/O beyond reading run spec files; the
//! async engine lives in `cantor-runtime`.
//!
//! ## Key Guarantees
//!
//! 1. **Bounded**: every review family stops after [`MAX_ATTEMPTS`] attempts
//! 2. **Fail-open**: a failed stage moves the run forward instead of looping
//! 3. **Resumable**: [`ExecutionState`] serializes completely
//!
//! ## Example
//!
//! ```rust,ignore
//! use cantor_core::{next_transition, ExecutionState, ParsedDocument, RunSpec};
//!
//! let spec = RunSpec::from_file("run.yaml")?;
//! let document = ParsedDocument::new("Civil law", "Contracts", body);
//! let mut state = ExecutionState::initial(document, spec.style, spec.cycles);
//!
//! // after a stage has produced its update:
//! state.apply(update);
//! state.advance(next_transition(&state));
//! ```

pub mod config;
pub mod document;
pub mod registry;
pub mod review;
pub mod state;
pub mod usage;
pub mod workflow;

// Re-export main types at crate root
pub use config::{ConfigError, CycleConfig, CycleModels, RunSpec, StageModels, MAX_CYCLES};
pub use document::ParsedDocument;
pub use registry::{ProviderRegistry, DEFAULT_PROVIDER};
pub use review::{
    DraftOutput, OutputSchema, ReviewNormalization, ReviewOutput, ReviewVerdict,
    StructuredOutput,
};
pub use state::{ExecutionState, ReviewFamily, ReviewStatus, Stage, StageUpdate};
pub use usage::{UsageEntry, UsageSummary};
pub use workflow::{is_resolved, next_transition, Transition, MAX_ATTEMPTS, MAX_STAGES_PER_CYCLE};
