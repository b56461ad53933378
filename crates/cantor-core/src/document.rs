//! Source document handed to a run.
//!
//! Parsing HTML or other source formats happens outside this workspace;
//! the engine only ever reads the extracted fields.

use serde::{Deserialize, Serialize};

/// Metadata and body text extracted from one source document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDocument {
    /// Broad theme of the document
    pub theme: String,

    /// Specific topic within the theme
    pub topic: String,

    /// Body text the composition is based on
    pub body: String,

    /// Non-fatal problems reported by the parser
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ParsedDocument {
    /// Create a document with no parser warnings.
    pub fn new(
        theme: impl Into<String>,
        topic: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            theme: theme.into(),
            topic: topic.into(),
            body: body.into(),
            warnings: Vec::new(),
        }
    }
}
