//! Circuit breaker over external webhook dispatch (§4.9).
//!
//! Opens after `threshold` consecutive failures; while open, external
//! targets are skipped (internal handlers still run). A single success
//! closes it again.

use std::sync::Mutex;
use std::time::{Duration, Instant};

struct State {
    consecutive_failures: u32,
    opened_until: Option<Instant>,
}

pub struct CircuitBreaker {
    threshold: u32,
    reset: Duration,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_secs: u64) -> Self {
        Self {
            threshold,
            reset: Duration::from_secs(reset_secs),
            state: Mutex::new(State { consecutive_failures: 0, opened_until: None }),
        }
    }

    pub fn is_open(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.opened_until.is_some_and(|until| Instant::now() < until)
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        state.consecutive_failures = 0;
        state.opened_until = None;
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.threshold {
            state.opened_until = Some(Instant::now() + self.reset);
            tracing::warn!(
                consecutive_failures = state.consecutive_failures,
                reset_secs = self.reset.as_secs(),
                "webhook circuit breaker opened"
            );
        }
    }
}
