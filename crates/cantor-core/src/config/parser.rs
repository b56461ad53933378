//! Run spec parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::schema::validate_run_spec_schema;
use crate::state::Stage;

/// Upper bound on cycles per run.
pub const MAX_CYCLES: u32 = 3;

/// Errors that can occur when parsing or validating run configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read run spec file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Schema validation failed: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("Run spec validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Primary and fallback model for one stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageModels {
    /// Model tried first
    pub primary: String,

    /// Model tried once if the primary call fails
    pub fallback: String,
}

impl StageModels {
    pub fn new(primary: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            fallback: fallback.into(),
        }
    }
}

/// Model assignments for every stage of one cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleModels {
    pub compose: StageModels,
    pub legal_review: StageModels,
    pub legal_adjust: StageModels,
    pub linguistic_review: StageModels,
    pub linguistic_adjust: StageModels,
}

impl CycleModels {
    /// Use the same primary/fallback pair for every stage.
    pub fn uniform(models: StageModels) -> Self {
        Self {
            compose: models.clone(),
            legal_review: models.clone(),
            legal_adjust: models.clone(),
            linguistic_review: models.clone(),
            linguistic_adjust: models,
        }
    }

    /// Models for a stage. `Terminal` has none.
    pub fn for_stage(&self, stage: Stage) -> Option<&StageModels> {
        match stage {
            Stage::Compose => Some(&self.compose),
            Stage::LegalReview => Some(&self.legal_review),
            Stage::LegalAdjust => Some(&self.legal_adjust),
            Stage::LinguisticReview => Some(&self.linguistic_review),
            Stage::LinguisticAdjust => Some(&self.linguistic_adjust),
            Stage::Terminal => None,
        }
    }

    fn entries(&self) -> [(Stage, &StageModels); 5] {
        [
            (Stage::Compose, &self.compose),
            (Stage::LegalReview, &self.legal_review),
            (Stage::LegalAdjust, &self.legal_adjust),
            (Stage::LinguisticReview, &self.linguistic_review),
            (Stage::LinguisticAdjust, &self.linguistic_adjust),
        ]
    }
}

/// Per-cycle model configuration, indexed by 1-based cycle number.
///
/// Serialized as a list; entry `i` configures cycle `i + 1`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CycleConfig {
    cycles: Vec<CycleModels>,
}

impl CycleConfig {
    pub fn new(cycles: Vec<CycleModels>) -> Self {
        Self { cycles }
    }

    /// Repeat the same cycle configuration `count` times.
    pub fn repeat(models: CycleModels, count: u32) -> Self {
        Self {
            cycles: (0..count).map(|_| models.clone()).collect(),
        }
    }

    /// Number of configured cycles.
    pub fn total_cycles(&self) -> u32 {
        self.cycles.len() as u32
    }

    /// Configuration of a 1-based cycle.
    pub fn get(&self, cycle_index: u32) -> Option<&CycleModels> {
        let position = cycle_index.checked_sub(1)? as usize;
        self.cycles.get(position)
    }

    /// Models assigned to a stage of a cycle.
    pub fn stage_models(&self, cycle_index: u32, stage: Stage) -> Option<&StageModels> {
        self.get(cycle_index)?.for_stage(stage)
    }

    /// Check cycle count and model ids.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycles.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one cycle must be configured".to_string(),
            ));
        }

        if self.total_cycles() > MAX_CYCLES {
            return Err(ConfigError::ValidationError(format!(
                "{} cycles configured, at most {} allowed",
                self.total_cycles(),
                MAX_CYCLES
            )));
        }

        for (position, cycle) in self.cycles.iter().enumerate() {
            for (stage, models) in cycle.entries() {
                if models.primary.trim().is_empty() {
                    return Err(ConfigError::MissingField(format!(
                        "cycles[{}].{}.primary",
                        position, stage
                    )));
                }
                if models.fallback.trim().is_empty() {
                    return Err(ConfigError::MissingField(format!(
                        "cycles[{}].{}.fallback",
                        position, stage
                    )));
                }
            }
        }

        Ok(())
    }
}

/// A complete run spec: the style plus per-cycle models.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSpec {
    /// Style the Compose stage writes in
    pub style: String,

    /// Per-cycle model assignments
    pub cycles: CycleConfig,
}

impl RunSpec {
    /// Parse a run spec from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a run spec from JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a run spec file, picking the format from the extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        validate_run_spec_schema(&value).map_err(ConfigError::SchemaViolation)?;
        let spec: RunSpec = serde_json::from_value(value)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Validate the run spec structure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.style.trim().is_empty() {
            return Err(ConfigError::MissingField("style".to_string()));
        }
        self.cycles.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_SPEC: &str = r#"
style: "bossa nova, playful"
cycles:
  - compose: { primary: "claude-sonnet-4-5", fallback: "gpt-4o" }
    legal_review: { primary: "gpt-4o", fallback: "gemini-2.5-pro" }
    legal_adjust: { primary: "claude-sonnet-4-5", fallback: "deepseek-chat" }
    linguistic_review: { primary: "gemini-2.5-pro", fallback: "gpt-4o" }
    linguistic_adjust: { primary: "claude-sonnet-4-5", fallback: "gpt-4o" }
  - compose: { primary: "gpt-5", fallback: "claude-opus-4-1" }
    legal_review: { primary: "gpt-4o", fallback: "gemini-2.5-pro" }
    legal_adjust: { primary: "claude-sonnet-4-5", fallback: "deepseek-chat" }
    linguistic_review: { primary: "gemini-2.5-pro", fallback: "gpt-4o" }
    linguistic_adjust: { primary: "claude-sonnet-4-5", fallback: "gpt-4o" }
"#;

    fn cycle() -> CycleModels {
        CycleModels::uniform(StageModels::new("gpt-4o", "claude-sonnet-4-5"))
    }

    #[test]
    fn test_parse_valid_spec() {
        let spec = RunSpec::from_yaml(VALID_SPEC).unwrap();
        assert_eq!(spec.style, "bossa nova, playful");
        assert_eq!(spec.cycles.total_cycles(), 2);
        assert_eq!(
            spec.cycles.stage_models(2, Stage::Compose).unwrap().primary,
            "gpt-5"
        );
    }

    #[test]
    fn test_cycle_index_is_one_based() {
        let config = CycleConfig::repeat(cycle(), 2);
        assert!(config.get(0).is_none());
        assert!(config.get(1).is_some());
        assert!(config.get(2).is_some());
        assert!(config.get(3).is_none());
    }

    #[test]
    fn test_terminal_has_no_models() {
        let config = CycleConfig::repeat(cycle(), 1);
        assert!(config.stage_models(1, Stage::Terminal).is_none());
    }

    #[test]
    fn test_empty_cycles_rejected() {
        let result = CycleConfig::default().validate();
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_too_many_cycles_rejected() {
        let result = CycleConfig::repeat(cycle(), MAX_CYCLES + 1).validate();
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_blank_model_rejected() {
        let mut models = cycle();
        models.legal_adjust.fallback = "  ".to_string();
        let result = CycleConfig::new(vec![models]).validate();
        match result {
            Err(ConfigError::MissingField(field)) => {
                assert_eq!(field, "cycles[0].legal_adjust.fallback");
            }
            other => panic!("Expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_stage_fails_schema() {
        let yaml = r#"
style: "rock"
cycles:
  - compose: { primary: "gpt-4o", fallback: "gpt-4o-mini" }
"#;
        let result = RunSpec::from_yaml(yaml);
        assert!(matches!(result, Err(ConfigError::SchemaViolation(_))));
    }

    #[test]
    fn test_json_spec_parses() {
        let spec = RunSpec::from_yaml(VALID_SPEC).unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        let reparsed = RunSpec::from_json(&json).unwrap();
        assert_eq!(reparsed, spec);
    }
}
