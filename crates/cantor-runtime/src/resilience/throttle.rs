//! Adaptive per-provider concurrency throttle.
//!
//! Each configured provider gets a semaphore sized to its limit. Call
//! outcomes feed a rolling window; sustained failures shrink the limit
//! (never below [`MIN_LIMIT`]) and a clean window grows it back toward the
//! configured value.
//!
//! A limit change swaps in a fresh semaphore under the provider's
//! adjustment lock and closes the old one. The new semaphore starts short
//! by the slots still held by calls admitted through older semaphores and
//! gets one permit back each time such a call finishes, so running calls
//! never exceed the current limit once a decrease has drained. Waiters
//! queued on a closed semaphore retry against the current one.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::window::{Outcome, OutcomeWindow, WINDOW_CAPACITY};

/// Limits are never decreased below this.
pub const MIN_LIMIT: usize = 2;

/// Samples needed before a decrease is considered.
const DECREASE_MIN_SAMPLES: usize = 10;

/// Failure rate above which the limit shrinks.
const DECREASE_FAILURE_RATE: f64 = 0.3;

/// Samples needed before an increase is considered.
const INCREASE_MIN_SAMPLES: usize = WINDOW_CAPACITY;

/// Success rate above which the limit grows.
const INCREASE_SUCCESS_RATE: f64 = 0.95;

/// Static per-provider concurrency limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Provider id -> maximum concurrent calls
    #[serde(default = "default_limits")]
    pub limits: BTreeMap<String, usize>,
}

fn default_limits() -> BTreeMap<String, usize> {
    [("openai", 5), ("anthropic", 5), ("google", 8), ("deepseek", 3)]
        .into_iter()
        .map(|(provider, limit)| (provider.to_string(), limit))
        .collect()
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            limits: default_limits(),
        }
    }
}

/// Observability snapshot for one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStats {
    pub total_calls: u64,
    pub successes: u64,
    pub failures: u64,

    /// Lifetime success rate (0.0 when no calls were made)
    pub success_rate: f64,

    pub current_limit: usize,
    pub original_limit: usize,

    /// Free slots of the current semaphore
    pub available_slots: usize,

    /// Mean latency of successful calls in the window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_latency_ms: Option<u64>,
}

#[derive(Debug)]
struct ProviderState {
    current_limit: usize,
    original_limit: usize,
    window: OutcomeWindow,
    total_calls: u64,
    successes: u64,
    failures: u64,

    /// Calls holding a slot, whichever semaphore admitted them
    in_flight: usize,

    /// Of those, calls admitted by a semaphore that has since been replaced
    stale_in_flight: usize,

    /// Permits the current semaphore still owes to draining stale calls
    withheld: usize,
}

impl ProviderState {
    fn new(limit: usize) -> Self {
        Self {
            current_limit: limit,
            original_limit: limit,
            window: OutcomeWindow::default(),
            total_calls: 0,
            successes: 0,
            failures: 0,
            in_flight: 0,
            stale_in_flight: 0,
            withheld: 0,
        }
    }
}

struct ProviderGate {
    semaphore: RwLock<Arc<Semaphore>>,

    /// Adjustment lock: every counter, window and limit change happens here
    state: Mutex<ProviderState>,
}

impl ProviderGate {
    fn new(limit: usize) -> Self {
        Self {
            semaphore: RwLock::new(Arc::new(Semaphore::new(limit))),
            state: Mutex::new(ProviderState::new(limit)),
        }
    }

    fn current_semaphore(&self) -> Arc<Semaphore> {
        self.semaphore.read().clone()
    }

    /// Wait for a slot on whichever semaphore is current once a permit is
    /// granted.
    async fn admit(&self, provider: &str) -> Slot<'_> {
        loop {
            let semaphore = self.current_semaphore();
            if semaphore.available_permits() == 0 {
                tracing::debug!(
                    provider,
                    current_limit = self.state.lock().current_limit,
                    "Waiting for throttle slot"
                );
            }

            // Closed means the limit changed while waiting
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                continue;
            };

            let mut state = self.state.lock();
            let current = self.semaphore.read();
            if Arc::ptr_eq(&semaphore, &*current) {
                state.in_flight += 1;
                return Slot {
                    gate: self,
                    semaphore,
                    _permit: permit,
                };
            }
        }
    }
}

/// A held concurrency slot. Dropping it releases the slot, including when
/// the caller is cancelled mid-call.
struct Slot<'a> {
    gate: &'a ProviderGate,
    semaphore: Arc<Semaphore>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);

        let current = self.gate.semaphore.read();
        if Arc::ptr_eq(&self.semaphore, &*current) {
            return;
        }

        // Stale call finished; hand its slot to the current semaphore once
        // fewer stale calls remain than permits withheld
        state.stale_in_flight = state.stale_in_flight.saturating_sub(1);
        if state.stale_in_flight < state.withheld {
            state.withheld -= 1;
            current.add_permits(1);
        }
    }
}

/// Bounded, self-adjusting concurrency gate shared by every run.
///
/// Construct once at startup and share it behind an `Arc`.
pub struct AdaptiveThrottler {
    gates: HashMap<String, ProviderGate>,
}

impl AdaptiveThrottler {
    /// Create a throttler from `{provider id: max concurrent calls}`.
    ///
    /// Provider ids are lowercased; a limit of 0 is raised to 1.
    pub fn new(limits: impl IntoIterator<Item = (String, usize)>) -> Self {
        let gates = limits
            .into_iter()
            .map(|(provider, limit)| (provider.to_lowercase(), ProviderGate::new(limit.max(1))))
            .collect();
        Self { gates }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(config.limits.clone())
    }

    /// Run `operation` once a slot for `provider` is free.
    ///
    /// The outcome is recorded before the slot is released and the
    /// operation's own result is returned unchanged. Unknown providers run
    /// immediately without throttling.
    pub async fn acquire_and_run<F, Fut, T, E>(&self, provider: &str, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(gate) = self.gates.get(provider) else {
            tracing::warn!(provider, "Provider not configured, running without throttling");
            return operation().await;
        };

        let _slot = gate.admit(provider).await;

        let started = Instant::now();
        let result = operation().await;
        let latency = started.elapsed();

        match &result {
            Ok(_) => self.record_success(provider, gate, latency),
            Err(_) => self.record_failure(provider, gate, latency),
        }

        result
    }

    fn record_success(&self, provider: &str, gate: &ProviderGate, latency: Duration) {
        let mut state = gate.state.lock();
        state.total_calls += 1;
        state.successes += 1;
        state.window.record(Outcome::now(true, latency));

        if state.window.len() < INCREASE_MIN_SAMPLES {
            return;
        }

        let success_rate = state.window.success_rate();
        if success_rate > INCREASE_SUCCESS_RATE && state.current_limit < state.original_limit {
            let old_limit = state.current_limit;
            let new_limit = old_limit + 1;
            replace_limit(gate, &mut state, new_limit);
            tracing::info!(
                provider,
                old_limit,
                new_limit,
                success_rate = %format!("{:.1}%", success_rate * 100.0),
                "Throttle limit increased"
            );
        }
    }

    fn record_failure(&self, provider: &str, gate: &ProviderGate, latency: Duration) {
        let mut state = gate.state.lock();
        state.total_calls += 1;
        state.failures += 1;
        state.window.record(Outcome::now(false, latency));

        if state.window.len() < DECREASE_MIN_SAMPLES {
            return;
        }

        let failure_rate = state.window.failure_rate();
        if failure_rate > DECREASE_FAILURE_RATE && state.current_limit > MIN_LIMIT {
            let old_limit = state.current_limit;
            let new_limit = (old_limit - 1).max(MIN_LIMIT);
            replace_limit(gate, &mut state, new_limit);
            tracing::warn!(
                provider,
                old_limit,
                new_limit,
                failure_rate = %format!("{:.1}%", failure_rate * 100.0),
                "Throttle limit decreased"
            );
        }
    }

    /// Snapshot of every configured provider.
    pub fn stats(&self) -> BTreeMap<String, ProviderStats> {
        self.gates
            .iter()
            .map(|(provider, gate)| {
                let state = gate.state.lock();
                let success_rate = if state.total_calls == 0 {
                    0.0
                } else {
                    state.successes as f64 / state.total_calls as f64
                };
                let stats = ProviderStats {
                    total_calls: state.total_calls,
                    successes: state.successes,
                    failures: state.failures,
                    success_rate,
                    current_limit: state.current_limit,
                    original_limit: state.original_limit,
                    available_slots: gate.current_semaphore().available_permits(),
                    mean_latency_ms: state
                        .window
                        .mean_success_latency()
                        .map(|d| d.as_millis() as u64),
                };
                (provider.clone(), stats)
            })
            .collect()
    }

    /// Current limit of a provider, if configured.
    pub fn current_limit(&self, provider: &str) -> Option<usize> {
        self.gates.get(provider).map(|g| g.state.lock().current_limit)
    }

    /// Restore every provider to its original limit and clear all counters.
    pub fn reset(&self) {
        for gate in self.gates.values() {
            let mut state = gate.state.lock();
            let original = state.original_limit;
            let in_flight = state.in_flight;
            *state = ProviderState::new(original);
            state.in_flight = in_flight;
            replace_limit(gate, &mut state, original);
        }
        tracing::info!("Throttler statistics and limits reset");
    }
}

/// Swap in a semaphore sized to `new_limit`, less the slots still held by
/// running calls. Caller holds the adjustment lock.
fn replace_limit(gate: &ProviderGate, state: &mut ProviderState, new_limit: usize) {
    state.current_limit = new_limit;
    state.stale_in_flight = state.in_flight;
    state.withheld = state.in_flight.min(new_limit);

    let fresh = Arc::new(Semaphore::new(new_limit - state.withheld));
    let old = std::mem::replace(&mut *gate.semaphore.write(), fresh);
    old.close();
}

impl Default for AdaptiveThrottler {
    fn default() -> Self {
        Self::from_config(&ThrottleConfig::default())
    }
}
