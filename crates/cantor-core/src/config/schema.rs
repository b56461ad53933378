//! JSON Schema validation for run specs.
//!
//! Run specs are validated against schema/run.schema.json before they are
//! deserialized, so structural mistakes are reported with their location.

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded run spec schema (loaded at compile time).
const RUN_SCHEMA_JSON: &str = include_str!("../../../../schema/run.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema validation.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = match serde_json::from_str(RUN_SCHEMA_JSON) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        match jsonschema::options().build(&schema_value) {
            Ok(v) => Ok(v),
            Err(e) => Err(format!("Failed to compile schema: {}", e)),
        }
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(SchemaError::LoadError(e.clone())),
    }
}

/// Validate a run spec JSON value against the schema.
///
/// Returns every violation, each suffixed with its instance path.
pub fn validate_run_spec_schema(spec_json: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(spec_json)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check if a run spec JSON value is valid against the schema.
pub fn is_valid_run_spec(spec_json: &serde_json::Value) -> bool {
    get_validator()
        .map(|v| v.is_valid(spec_json))
        .unwrap_or(false)
}
