//! Structured stage outputs and review normalization.
//!
//! Model adapters return one of these shapes already validated; the
//! consistency rules between a review's status and its issues are applied
//! here, before anything reaches the execution state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output shape a stage asks the model for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSchema {
    /// A full draft text (compose and adjust stages)
    Draft,

    /// A verdict plus issue list (review stages)
    Review,
}

impl OutputSchema {
    /// JSON Schema describing the expected model output.
    pub fn json_schema(&self) -> serde_json::Value {
        match self {
            OutputSchema::Draft => serde_json::json!({
                "type": "object",
                "required": ["text"],
                "properties": {
                    "text": { "type": "string", "description": "The complete draft" }
                }
            }),
            OutputSchema::Review => serde_json::json!({
                "type": "object",
                "required": ["status", "issues"],
                "properties": {
                    "status": { "type": "string", "enum": ["approved", "rejected"] },
                    "issues": { "type": "array", "items": { "type": "string" } }
                }
            }),
        }
    }
}

impl fmt::Display for OutputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSchema::Draft => write!(f, "draft"),
            OutputSchema::Review => write!(f, "review"),
        }
    }
}

/// A generated or adjusted draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftOutput {
    #[serde(alias = "draft")]
    pub text: String,
}

/// Verdict a reviewer may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved,
    Rejected,
}

/// A reviewer's verdict and the issues it found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewOutput {
    pub status: ReviewVerdict,

    #[serde(default)]
    pub issues: Vec<String>,
}

/// Which consistency corrections to apply to review results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewNormalization {
    /// Also turn `rejected` with no issues into `approved`
    #[serde(default)]
    pub approve_rejected_without_issues: bool,
}

impl ReviewOutput {
    pub fn approved() -> Self {
        Self {
            status: ReviewVerdict::Approved,
            issues: Vec::new(),
        }
    }

    pub fn rejected(issues: Vec<String>) -> Self {
        Self {
            status: ReviewVerdict::Rejected,
            issues,
        }
    }

    /// Apply consistency corrections.
    ///
    /// `approved` with a non-empty issue list always becomes `rejected`.
    /// `rejected` with no issues becomes `approved` only when enabled.
    /// Returns the corrected output and whether anything changed.
    pub fn normalize(mut self, rules: ReviewNormalization) -> (Self, bool) {
        let original = self.status;

        match self.status {
            ReviewVerdict::Approved if !self.issues.is_empty() => {
                self.status = ReviewVerdict::Rejected;
            }
            ReviewVerdict::Rejected
                if self.issues.is_empty() && rules.approve_rejected_without_issues =>
            {
                self.status = ReviewVerdict::Approved;
            }
            _ => {}
        }

        let changed = self.status != original;
        (self, changed)
    }
}

/// Validated model output of either shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuredOutput {
    Draft(DraftOutput),
    Review(ReviewOutput),
}

impl StructuredOutput {
    pub fn draft(text: impl Into<String>) -> Self {
        StructuredOutput::Draft(DraftOutput { text: text.into() })
    }

    /// The schema this output conforms to.
    pub fn schema(&self) -> OutputSchema {
        match self {
            StructuredOutput::Draft(_) => OutputSchema::Draft,
            StructuredOutput::Review(_) => OutputSchema::Review,
        }
    }

    /// Parse a JSON value into the shape `schema` asks for.
    pub fn from_json(
        schema: OutputSchema,
        value: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        match schema {
            OutputSchema::Draft => serde_json::from_value(value).map(StructuredOutput::Draft),
            OutputSchema::Review => serde_json::from_value(value).map(StructuredOutput::Review),
        }
    }
}
