//! Run spec parsing and validation.
//!
//! A run spec names the style to compose in and, per cycle, the primary
//! and fallback model of every stage. Specs are structured data validated
//! against `schema/run.schema.json` before they are deserialized.

mod parser;
mod schema;

pub use parser::{ConfigError, CycleConfig, CycleModels, RunSpec, StageModels, MAX_CYCLES};
pub use schema::{is_valid_run_spec, validate_run_spec_schema};
