//! Execution state of one run.
//!
//! The workflow engine is the single owner of an [`ExecutionState`]. Stage
//! executors never mutate it; they return a [`StageUpdate`] which the engine
//! merges with [`ExecutionState::apply`] before evaluating the next
//! transition.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{ConfigError, CycleConfig};
use crate::document::ParsedDocument;
use crate::usage::{UsageEntry, UsageSummary};
use crate::workflow::{Transition, MAX_ATTEMPTS};

/// One node of the per-cycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Compose,
    LegalReview,
    LegalAdjust,
    LinguisticReview,
    LinguisticAdjust,
    /// The run has finished; nothing left to execute
    Terminal,
}

impl Stage {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Compose => "compose",
            Stage::LegalReview => "legal_review",
            Stage::LegalAdjust => "legal_adjust",
            Stage::LinguisticReview => "linguistic_review",
            Stage::LinguisticAdjust => "linguistic_adjust",
            Stage::Terminal => "terminal",
        }
    }

    /// Attempt-counter family charged when this stage fails.
    ///
    /// Compose is charged to the legal family, since legal review is the
    /// stage that consumes its draft.
    pub fn family(&self) -> Option<ReviewFamily> {
        match self {
            Stage::Compose | Stage::LegalReview | Stage::LegalAdjust => Some(ReviewFamily::Legal),
            Stage::LinguisticReview | Stage::LinguisticAdjust => Some(ReviewFamily::Linguistic),
            Stage::Terminal => None,
        }
    }

    pub fn is_review(&self) -> bool {
        matches!(self, Stage::LegalReview | Stage::LinguisticReview)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two review families, each with its own status and attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewFamily {
    Legal,
    Linguistic,
}

impl fmt::Display for ReviewFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewFamily::Legal => write!(f, "legal"),
            ReviewFamily::Linguistic => write!(f, "linguistic"),
        }
    }
}

/// Status of a review family within the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Failed,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewStatus::Pending => write!(f, "pending"),
            ReviewStatus::Approved => write!(f, "approved"),
            ReviewStatus::Rejected => write!(f, "rejected"),
            ReviewStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Partial state produced by one stage execution.
///
/// `None` fields leave the corresponding state untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageUpdate {
    pub draft: Option<String>,
    pub previous_draft: Option<String>,
    pub legal_status: Option<ReviewStatus>,
    pub legal_issues: Option<Vec<String>>,
    pub legal_attempts: Option<u32>,
    pub linguistic_status: Option<ReviewStatus>,
    pub linguistic_issues: Option<Vec<String>>,
    pub linguistic_attempts: Option<u32>,
    pub usage: Option<UsageEntry>,
}

impl StageUpdate {
    /// Set the status of one family.
    pub fn with_status(mut self, family: ReviewFamily, status: ReviewStatus) -> Self {
        match family {
            ReviewFamily::Legal => self.legal_status = Some(status),
            ReviewFamily::Linguistic => self.linguistic_status = Some(status),
        }
        self
    }

    /// Set the issue list of one family.
    pub fn with_issues(mut self, family: ReviewFamily, issues: Vec<String>) -> Self {
        match family {
            ReviewFamily::Legal => self.legal_issues = Some(issues),
            ReviewFamily::Linguistic => self.linguistic_issues = Some(issues),
        }
        self
    }

    /// Set the attempt counter of one family.
    pub fn with_attempts(mut self, family: ReviewFamily, attempts: u32) -> Self {
        match family {
            ReviewFamily::Legal => self.legal_attempts = Some(attempts),
            ReviewFamily::Linguistic => self.linguistic_attempts = Some(attempts),
        }
        self
    }

    pub fn with_usage(mut self, usage: UsageEntry) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Everything a run knows about its progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Current cycle, 1-based
    pub cycle_index: u32,

    /// Next stage to execute
    pub stage: Stage,

    /// Source document (read-only input)
    pub document: ParsedDocument,

    /// Style the Compose stage writes in
    pub style: String,

    /// Current draft
    pub draft: String,

    /// Draft before the most recent compose or adjustment
    pub previous_draft: Option<String>,

    pub legal_status: ReviewStatus,
    pub linguistic_status: ReviewStatus,

    pub legal_issues: Vec<String>,
    pub linguistic_issues: Vec<String>,

    /// Legal review attempts in the current cycle
    pub legal_attempts: u32,

    /// Linguistic review attempts in the current cycle
    pub linguistic_attempts: u32,

    /// Per-cycle model assignments
    pub cycle_config: CycleConfig,

    /// Which model served each successful stage call
    pub usage_ledger: Vec<UsageEntry>,
}

impl ExecutionState {
    /// Initial state: Compose at cycle 1, all attempts 0, all statuses Pending.
    pub fn initial(
        document: ParsedDocument,
        style: impl Into<String>,
        cycle_config: CycleConfig,
    ) -> Self {
        Self {
            cycle_index: 1,
            stage: Stage::Compose,
            document,
            style: style.into(),
            draft: String::new(),
            previous_draft: None,
            legal_status: ReviewStatus::Pending,
            linguistic_status: ReviewStatus::Pending,
            legal_issues: Vec::new(),
            linguistic_issues: Vec::new(),
            legal_attempts: 0,
            linguistic_attempts: 0,
            cycle_config,
            usage_ledger: Vec::new(),
        }
    }

    pub fn total_cycles(&self) -> u32 {
        self.cycle_config.total_cycles()
    }

    pub fn is_terminal(&self) -> bool {
        self.stage == Stage::Terminal
    }

    /// True when either family ended in `Failed`.
    pub fn is_degraded(&self) -> bool {
        self.legal_status == ReviewStatus::Failed || self.linguistic_status == ReviewStatus::Failed
    }

    pub fn status(&self, family: ReviewFamily) -> ReviewStatus {
        match family {
            ReviewFamily::Legal => self.legal_status,
            ReviewFamily::Linguistic => self.linguistic_status,
        }
    }

    pub fn attempts(&self, family: ReviewFamily) -> u32 {
        match family {
            ReviewFamily::Legal => self.legal_attempts,
            ReviewFamily::Linguistic => self.linguistic_attempts,
        }
    }

    pub fn issues(&self, family: ReviewFamily) -> &[String] {
        match family {
            ReviewFamily::Legal => &self.legal_issues,
            ReviewFamily::Linguistic => &self.linguistic_issues,
        }
    }

    /// Check that the state is something the engine can drive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cycle_config.validate()?;

        if self.cycle_index == 0 || self.cycle_index > self.total_cycles() {
            return Err(ConfigError::ValidationError(format!(
                "cycle_index {} outside 1..={}",
                self.cycle_index,
                self.total_cycles()
            )));
        }

        if self.legal_attempts > MAX_ATTEMPTS || self.linguistic_attempts > MAX_ATTEMPTS {
            return Err(ConfigError::ValidationError(format!(
                "attempt counters ({}, {}) exceed {}",
                self.legal_attempts, self.linguistic_attempts, MAX_ATTEMPTS
            )));
        }

        Ok(())
    }

    /// Merge a stage's partial update.
    ///
    /// Attempt counters are clamped to `MAX_ATTEMPTS`.
    pub fn apply(&mut self, update: StageUpdate) {
        if let Some(draft) = update.draft {
            self.draft = draft;
        }
        if let Some(previous) = update.previous_draft {
            self.previous_draft = Some(previous);
        }
        if let Some(status) = update.legal_status {
            self.legal_status = status;
        }
        if let Some(issues) = update.legal_issues {
            self.legal_issues = issues;
        }
        if let Some(attempts) = update.legal_attempts {
            self.legal_attempts = attempts.min(MAX_ATTEMPTS);
        }
        if let Some(status) = update.linguistic_status {
            self.linguistic_status = status;
        }
        if let Some(issues) = update.linguistic_issues {
            self.linguistic_issues = issues;
        }
        if let Some(attempts) = update.linguistic_attempts {
            self.linguistic_attempts = attempts.min(MAX_ATTEMPTS);
        }
        if let Some(usage) = update.usage {
            self.usage_ledger.push(usage);
        }
    }

    /// Move to the stage chosen by the transition rules.
    pub fn advance(&mut self, transition: Transition) {
        match transition {
            Transition::To(stage) => self.stage = stage,
            Transition::NextCycle => self.begin_cycle(self.cycle_index + 1),
            Transition::Terminal => self.stage = Stage::Terminal,
        }
    }

    fn begin_cycle(&mut self, cycle_index: u32) {
        self.cycle_index = cycle_index;
        self.stage = Stage::Compose;
        self.legal_status = ReviewStatus::Pending;
        self.linguistic_status = ReviewStatus::Pending;
        self.legal_issues.clear();
        self.linguistic_issues.clear();
        self.legal_attempts = 0;
        self.linguistic_attempts = 0;
    }

    /// Rough completion percentage for progress reporting.
    pub fn progress_percent(&self) -> u8 {
        let total = self.total_cycles().max(1);
        if self.is_terminal() {
            return 100;
        }

        // Thirds of a cycle: compose, legal, linguistic
        let within = match self.stage {
            Stage::Compose => 0,
            Stage::LegalReview | Stage::LegalAdjust => 1,
            Stage::LinguisticReview | Stage::LinguisticAdjust => 2,
            Stage::Terminal => 3,
        };
        let done_thirds = (self.cycle_index.saturating_sub(1)) * 3 + within;
        let percent = done_thirds * 100 / (total * 3);
        percent.min(99) as u8
    }

    pub fn usage_summary(&self) -> UsageSummary {
        UsageSummary::from_ledger(&self.usage_ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CycleModels, StageModels};

    fn state(cycles: u32) -> ExecutionState {
        let models = CycleModels::uniform(StageModels::new("gpt-4o", "claude-sonnet-4-5"));
        ExecutionState::initial(
            ParsedDocument::new("Law", "Contracts", "body"),
            "samba",
            CycleConfig::repeat(models, cycles),
        )
    }

    #[test]
    fn test_initial_state() {
        let s = state(3);
        assert_eq!(s.cycle_index, 1);
        assert_eq!(s.stage, Stage::Compose);
        assert_eq!(s.legal_status, ReviewStatus::Pending);
        assert_eq!(s.linguistic_status, ReviewStatus::Pending);
        assert_eq!(s.legal_attempts, 0);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_apply_clamps_attempts() {
        let mut s = state(1);
        s.apply(StageUpdate::default().with_attempts(ReviewFamily::Legal, MAX_ATTEMPTS + 3));
        assert_eq!(s.legal_attempts, MAX_ATTEMPTS);
    }

    #[test]
    fn test_apply_leaves_unset_fields() {
        let mut s = state(1);
        s.draft = "first".to_string();
        s.apply(StageUpdate::default().with_status(ReviewFamily::Linguistic, ReviewStatus::Rejected));
        assert_eq!(s.draft, "first");
        assert_eq!(s.linguistic_status, ReviewStatus::Rejected);
        assert_eq!(s.legal_status, ReviewStatus::Pending);
    }

    #[test]
    fn test_next_cycle_resets_counters() {
        let mut s = state(2);
        s.stage = Stage::LinguisticReview;
        s.legal_attempts = 3;
        s.linguistic_attempts = 2;
        s.legal_status = ReviewStatus::Approved;
        s.linguistic_issues = vec!["meter".to_string()];

        s.advance(Transition::NextCycle);

        assert_eq!(s.cycle_index, 2);
        assert_eq!(s.stage, Stage::Compose);
        assert_eq!(s.legal_attempts, 0);
        assert_eq!(s.linguistic_attempts, 0);
        assert_eq!(s.legal_status, ReviewStatus::Pending);
        assert!(s.linguistic_issues.is_empty());
    }

    #[test]
    fn test_validate_rejects_out_of_range_cycle() {
        let mut s = state(2);
        s.cycle_index = 3;
        assert!(s.validate().is_err());
        s.cycle_index = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_progress_percent() {
        let mut s = state(2);
        assert_eq!(s.progress_percent(), 0);
        s.stage = Stage::LinguisticReview;
        assert_eq!(s.progress_percent(), 33);
        s.advance(Transition::Terminal);
        assert_eq!(s.progress_percent(), 100);
    }

    #[test]
    fn test_state_roundtrips_through_json() {
        let mut s = state(1);
        s.stage = Stage::LegalAdjust;
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"legal_adjust\""));
        let back: ExecutionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
