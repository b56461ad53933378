//! Transition rules of the review cycle.
//!
//! ```text
//! Compose -> LegalReview -> { resolved: LinguisticReview | LegalAdjust -> LegalReview }
//!         -> LinguisticReview -> { resolved: end of cycle | LinguisticAdjust -> LinguisticReview }
//! end of cycle: cycle < total ? Compose(cycle + 1) : Terminal
//! ```
//!
//! A review family is *resolved* when its status is `Approved`, when it is
//! `Failed`, or when its attempt counter has reached [`MAX_ATTEMPTS`]. A
//! failed adjust stage also moves forward instead of looping back to its
//! review. Every path therefore reaches `Terminal` after a bounded number
//! of stages.

use serde::{Deserialize, Serialize};

use crate::state::{ExecutionState, ReviewFamily, ReviewStatus, Stage};

/// Review attempts allowed per family per cycle.
pub const MAX_ATTEMPTS: u32 = 5;

/// Upper bound on stage executions in one cycle.
///
/// One compose plus, per family, `MAX_ATTEMPTS` reviews and
/// `MAX_ATTEMPTS - 1` adjustments.
pub const MAX_STAGES_PER_CYCLE: u32 = 1 + 2 * (2 * MAX_ATTEMPTS - 1);

/// What the engine does after a stage's update has been merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "stage", rename_all = "snake_case")]
pub enum Transition {
    /// Continue with another stage of the same cycle
    To(Stage),

    /// Start the next cycle at Compose
    NextCycle,

    /// The final cycle is done
    Terminal,
}

/// Whether a review family may stop iterating.
pub fn is_resolved(status: ReviewStatus, attempts: u32) -> bool {
    matches!(status, ReviewStatus::Approved | ReviewStatus::Failed) || attempts >= MAX_ATTEMPTS
}

/// Decide the transition out of `state.stage`.
pub fn next_transition(state: &ExecutionState) -> Transition {
    let legal_done = is_resolved(state.legal_status, state.legal_attempts);
    let linguistic_done = is_resolved(state.linguistic_status, state.linguistic_attempts);

    match state.stage {
        Stage::Compose => Transition::To(Stage::LegalReview),
        Stage::LegalReview if legal_done => Transition::To(Stage::LinguisticReview),
        Stage::LegalReview => Transition::To(Stage::LegalAdjust),
        Stage::LegalAdjust if failed(state, ReviewFamily::Legal) => {
            Transition::To(Stage::LinguisticReview)
        }
        Stage::LegalAdjust => Transition::To(Stage::LegalReview),
        Stage::LinguisticReview if linguistic_done => end_of_cycle(state),
        Stage::LinguisticReview => Transition::To(Stage::LinguisticAdjust),
        Stage::LinguisticAdjust if failed(state, ReviewFamily::Linguistic) => end_of_cycle(state),
        Stage::LinguisticAdjust => Transition::To(Stage::LinguisticReview),
        Stage::Terminal => Transition::Terminal,
    }
}

fn failed(state: &ExecutionState, family: ReviewFamily) -> bool {
    state.status(family) == ReviewStatus::Failed
}

fn end_of_cycle(state: &ExecutionState) -> Transition {
    if state.cycle_index < state.total_cycles() {
        Transition::NextCycle
    } else {
        Transition::Terminal
    }
}
