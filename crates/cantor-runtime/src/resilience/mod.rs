//! Resilience patterns for cantor-runtime.
//!
//! This module provides:
//! - Adaptive per-provider concurrency throttling
//! - The rolling outcome window that drives limit changes

mod throttle;
mod window;

pub use throttle::{AdaptiveThrottler, ProviderStats, ThrottleConfig, MIN_LIMIT};
pub use window::{Outcome, OutcomeWindow, WINDOW_CAPACITY};
