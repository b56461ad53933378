//! Prompt templates for the five stages.
//!
//! [`PromptTemplates`] is the seam for custom wording; each method reads
//! only the state fields its stage needs. [`PlainTemplates`] is a compact
//! default:
//! 1. Compose sees the document and the style
//! 2. Reviews see the draft (and, for legal review, the source text)
//! 3. Adjustments see the draft and the issues to fix

use cantor_core::ExecutionState;

use crate::gateway::Prompt;

/// Builds system and user prompts per stage.
pub trait PromptTemplates: Send + Sync {
    fn compose(&self, state: &ExecutionState) -> Prompt;
    fn legal_review(&self, state: &ExecutionState) -> Prompt;
    fn legal_adjust(&self, state: &ExecutionState) -> Prompt;
    fn linguistic_review(&self, state: &ExecutionState) -> Prompt;
    fn linguistic_adjust(&self, state: &ExecutionState) -> Prompt;
}

/// Songwriter persona used by Compose and both Adjust stages.
pub const COMPOSER_SYSTEM_PROMPT: &str = r#"
You are an experienced teacher and songwriter who turns dense legal material
into memorable songs for students.

## Guidelines
1. Every legal statement in the lyrics must be accurate
2. Keep the key terms of the topic recognisable
3. Favour rhythm and repetition that help memorisation
4. Write the complete lyrics, never a summary of changes
"#;

/// Legal accuracy reviewer persona.
pub const LEGAL_REVIEW_SYSTEM_PROMPT: &str = r#"
You are a legal expert reviewing educational song lyrics for accuracy.

## Review Rules
1. Check every legal claim against the source text
2. Report each inaccuracy, omission of an essential element, or misleading
   simplification as one issue
3. Approve only when there are no issues
"#;

/// Language and prosody reviewer persona.
pub const LINGUISTIC_REVIEW_SYSTEM_PROMPT: &str = r#"
You are an editor reviewing song lyrics for language quality.

## Review Rules
1. Check grammar, spelling, and punctuation
2. Check that the lyrics read naturally and can be sung
3. Report each problem as one issue
4. Approve only when there are no issues
"#;

/// Default English templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTemplates;

impl PlainTemplates {
    fn issue_list(issues: &[String]) -> String {
        if issues.is_empty() {
            return "- (no specific issues were recorded)".to_string();
        }
        issues
            .iter()
            .map(|issue| format!("- {}", issue))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl PromptTemplates for PlainTemplates {
    fn compose(&self, state: &ExecutionState) -> Prompt {
        let doc = &state.document;
        Prompt {
            system: format!(
                "{}\nSubject area: {}\nMusical style: {}",
                COMPOSER_SYSTEM_PROMPT.trim(),
                doc.theme,
                state.style
            ),
            user: format!(
                "Write song lyrics teaching {theme} - {topic} in the style \"{style}\".\n\n\
                 ## Source text\n{body}",
                theme = doc.theme,
                topic = doc.topic,
                style = state.style,
                body = doc.body
            ),
        }
    }

    fn legal_review(&self, state: &ExecutionState) -> Prompt {
        let doc = &state.document;
        Prompt {
            system: LEGAL_REVIEW_SYSTEM_PROMPT.trim().to_string(),
            user: format!(
                "Topic: {} - {}\n\n## Source text\n{}\n\n## Lyrics\n{}",
                doc.theme, doc.topic, doc.body, state.draft
            ),
        }
    }

    fn legal_adjust(&self, state: &ExecutionState) -> Prompt {
        Prompt {
            system: COMPOSER_SYSTEM_PROMPT.trim().to_string(),
            user: format!(
                "Fix the legal issues below and return the complete corrected lyrics.\n\n\
                 ## Issues\n{}\n\n## Lyrics\n{}\n\n## Source text\n{}",
                Self::issue_list(&state.legal_issues),
                state.draft,
                state.document.body
            ),
        }
    }

    fn linguistic_review(&self, state: &ExecutionState) -> Prompt {
        let doc = &state.document;
        Prompt {
            system: LINGUISTIC_REVIEW_SYSTEM_PROMPT.trim().to_string(),
            user: format!(
                "These lyrics teach {} - {}.\n\n## Lyrics\n{}",
                doc.theme, doc.topic, state.draft
            ),
        }
    }

    fn linguistic_adjust(&self, state: &ExecutionState) -> Prompt {
        Prompt {
            system: COMPOSER_SYSTEM_PROMPT.trim().to_string(),
            user: format!(
                "Fix the language issues below without changing the legal content, \
                 and return the complete corrected lyrics.\n\n## Issues\n{}\n\n## Lyrics\n{}",
                Self::issue_list(&state.linguistic_issues),
                state.draft
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantor_core::{CycleConfig, CycleModels, ParsedDocument, StageModels};

    fn state() -> ExecutionState {
        let models = CycleModels::uniform(StageModels::new("gpt-4o", "claude-sonnet-4-5"));
        let mut state = ExecutionState::initial(
            ParsedDocument::new("Civil law", "Contracts", "A contract is an agreement."),
            "bossa nova",
            CycleConfig::repeat(models, 1),
        );
        state.draft = "La la contract".to_string();
        state
    }

    #[test]
    fn test_compose_uses_document_and_style() {
        let prompt = PlainTemplates.compose(&state());
        assert!(prompt.system.contains("bossa nova"));
        assert!(prompt.user.contains("Civil law - Contracts"));
        assert!(prompt.user.contains("A contract is an agreement."));
    }

    #[test]
    fn test_legal_review_includes_source_and_draft() {
        let prompt = PlainTemplates.legal_review(&state());
        assert!(prompt.user.contains("A contract is an agreement."));
        assert!(prompt.user.contains("La la contract"));
    }

    #[test]
    fn test_adjust_lists_issues() {
        let mut s = state();
        s.linguistic_issues = vec!["rhyme in verse 2".to_string(), "typo".to_string()];
        let prompt = PlainTemplates.linguistic_adjust(&s);
        assert!(prompt.user.contains("- rhyme in verse 2\n- typo"));
        assert!(!prompt.user.contains("A contract is an agreement."));
    }

    #[test]
    fn test_adjust_without_issues_still_renders() {
        let prompt = PlainTemplates.legal_adjust(&state());
        assert!(prompt.user.contains("no specific issues"));
    }
}
