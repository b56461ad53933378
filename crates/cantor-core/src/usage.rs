//! Usage ledger for model calls.
//!
//! Every successful stage call appends one [`UsageEntry`]; the summary is
//! derived from the ledger on demand and never stored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::state::Stage;

/// Which model served one successful stage call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    /// Cycle the call belonged to
    pub cycle: u32,

    /// Stage that made the call
    pub stage: Stage,

    /// Model that produced the accepted output
    pub model_used: String,

    /// Whether the primary model failed and the fallback answered
    pub used_fallback: bool,
}

/// Aggregated view of a usage ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Successful stage calls
    pub total_calls: u32,

    /// Calls answered by the fallback model
    pub fallback_calls: u32,

    /// Calls per model id
    pub by_model: BTreeMap<String, u32>,

    /// Calls per stage
    pub by_stage: BTreeMap<Stage, u32>,
}

impl UsageSummary {
    /// Build a summary from ledger entries.
    pub fn from_ledger(entries: &[UsageEntry]) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            summary.add(entry);
        }
        summary
    }

    /// Count one entry.
    pub fn add(&mut self, entry: &UsageEntry) {
        self.total_calls += 1;
        if entry.used_fallback {
            self.fallback_calls += 1;
        }
        *self.by_model.entry(entry.model_used.clone()).or_insert(0) += 1;
        *self.by_stage.entry(entry.stage).or_insert(0) += 1;
    }

    /// Fraction of calls that needed the fallback model.
    pub fn fallback_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.fallback_calls as f64 / self.total_calls as f64
        }
    }
}
