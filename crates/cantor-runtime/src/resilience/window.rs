//! Rolling window of recent call outcomes.

use std::collections::VecDeque;
use std::time::Duration;

/// Samples kept per provider.
pub const WINDOW_CAPACITY: usize = 20;

/// One finished call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,

    /// Wall-clock completion time, milliseconds since the Unix epoch
    pub timestamp_ms: i64,

    pub latency_ms: u64,
}

impl Outcome {
    pub fn now(success: bool, latency: Duration) -> Self {
        Self {
            success,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            latency_ms: latency.as_millis() as u64,
        }
    }
}

/// Fixed-capacity ring buffer; the oldest sample is evicted first.
#[derive(Debug, Clone)]
pub struct OutcomeWindow {
    samples: VecDeque<Outcome>,
    capacity: usize,
}

impl OutcomeWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, outcome: Outcome) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(outcome);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Share of successful samples; 0.0 when empty.
    pub fn success_rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let successes = self.samples.iter().filter(|o| o.success).count();
        successes as f64 / self.samples.len() as f64
    }

    /// Share of failed samples; 0.0 when empty.
    pub fn failure_rate(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            1.0 - self.success_rate()
        }
    }

    /// Mean latency of successful samples.
    pub fn mean_success_latency(&self) -> Option<Duration> {
        let latencies: Vec<u64> = self
            .samples
            .iter()
            .filter(|o| o.success)
            .map(|o| o.latency_ms)
            .collect();
        if latencies.is_empty() {
            return None;
        }
        let mean = latencies.iter().sum::<u64>() / latencies.len() as u64;
        Some(Duration::from_millis(mean))
    }
}

impl Default for OutcomeWindow {
    fn default() -> Self {
        Self::new(WINDOW_CAPACITY)
    }
}
