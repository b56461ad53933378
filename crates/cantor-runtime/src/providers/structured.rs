//! Turning raw model text into validated structured output.

use cantor_core::{OutputSchema, StructuredOutput};
use serde_json::Value as JsonValue;

use super::ProviderError;

/// Instruction appended to every system prompt so the model answers with
/// a single JSON object of the requested shape.
pub fn schema_instruction(schema: OutputSchema) -> String {
    format!(
        "Respond with a single JSON object and nothing else. \
         It must conform to this JSON Schema:\n{}",
        schema.json_schema()
    )
}

/// Parse the first JSON object found in `raw` into `schema`'s shape.
///
/// Models often wrap JSON in prose or code fences; anything before the
/// first `{` and after the end of that object is ignored.
pub fn parse_structured(schema: OutputSchema, raw: &str) -> Result<StructuredOutput, ProviderError> {
    let start = raw
        .find('{')
        .ok_or_else(|| ProviderError::Validation(format!("no JSON object in {} output", schema)))?;

    let value = serde_json::Deserializer::from_str(&raw[start..])
        .into_iter::<JsonValue>()
        .next()
        .ok_or_else(|| ProviderError::Validation(format!("empty {} output", schema)))?
        .map_err(|e| ProviderError::Validation(format!("malformed JSON: {}", e)))?;

    StructuredOutput::from_json(schema, value)
        .map_err(|e| ProviderError::Validation(format!("{} output: {}", schema, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantor_core::{ReviewOutput, ReviewVerdict};

    #[test]
    fn test_parses_fenced_review() {
        let raw = "Here you go:\n```json\n{\"status\": \"rejected\", \"issues\": [\"rhyme\"]}\n```";
        let output = parse_structured(OutputSchema::Review, raw).unwrap();
        assert_eq!(
            output,
            StructuredOutput::Review(ReviewOutput {
                status: ReviewVerdict::Rejected,
                issues: vec!["rhyme".to_string()],
            })
        );
    }

    #[test]
    fn test_parses_draft() {
        let raw = r#"{"text": "Verse one\nChorus"} trailing words"#;
        let output = parse_structured(OutputSchema::Draft, raw).unwrap();
        assert_eq!(output, StructuredOutput::draft("Verse one\nChorus"));
    }

    #[test]
    fn test_no_object_is_validation_error() {
        let result = parse_structured(OutputSchema::Draft, "I cannot help with that.");
        assert!(matches!(result, Err(ProviderError::Validation(_))));
    }

    #[test]
    fn test_wrong_shape_is_validation_error() {
        let result = parse_structured(OutputSchema::Review, r#"{"text": "a draft"}"#);
        assert!(matches!(result, Err(ProviderError::Validation(_))));
    }

    #[test]
    fn test_truncated_json_is_validation_error() {
        let result = parse_structured(OutputSchema::Review, r#"{"status": "appro"#);
        assert!(matches!(result, Err(ProviderError::Validation(_))));
    }

    #[test]
    fn test_instruction_embeds_schema() {
        let instruction = schema_instruction(OutputSchema::Review);
        assert!(instruction.contains("\"issues\""));
    }
}
