//! Per-operation circuit breaker.
//!
//! States: `Closed -> Open -> HalfOpen -> Closed`. A rolling window of
//! recent outcomes decides the `Closed -> Open` transition; a timer decides
//! when an `Open` breaker allows a single `HalfOpen` probe.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

/// The only error this module can surface: the breaker short-circuited the
/// call without invoking the downstream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BreakerError {
    /// The named operation's breaker is open.
    #[error("circuit open for operation {0}")]
    Open(String),
}

/// Configuration for [`CircuitBreaker`].
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Failure rate (0.0-1.0) in the rolling window that trips the breaker.
    pub failure_threshold: f64,
    /// Minimum number of calls in the window before the threshold applies.
    pub minimum_calls: usize,
    /// How long the window retains outcomes.
    pub monitoring_window: Duration,
    /// How long an `Open` breaker waits before admitting a probe.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 0.5,
            minimum_calls: 10,
            monitoring_window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through normally.
    Closed,
    /// Calls fail immediately with [`BreakerError`].
    Open,
    /// A single probe call is admitted; its outcome decides the next state.
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    at: Instant,
    success: bool,
}

struct Inner {
    state: CircuitState,
    window: VecDeque<Outcome>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Observable breaker statistics.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerStatus {
    /// Current state.
    pub state: CircuitState,
    /// Failures within the current window.
    pub failures: usize,
    /// Total calls within the current window.
    pub calls: usize,
    /// Success rate within the current window, `NaN` if empty.
    pub success_rate: f64,
    /// When a probe will next be admitted, if `Open`.
    pub next_attempt_at: Option<Instant>,
}

/// Per-operation circuit breaker. One instance guards one named downstream
/// operation; the engine keeps a breaker per operation kind (embed, store).
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Builds a new, closed breaker for the named operation.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    fn prune(window: &mut VecDeque<Outcome>, now: Instant, monitoring_window: Duration) {
        while let Some(front) = window.front() {
            if now.duration_since(front.at) > monitoring_window {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Checks whether a call may proceed, transitioning `Open -> HalfOpen`
    /// if the reset timeout has elapsed. Returns `BreakerError::Open` if the
    /// call must be short-circuited.
    pub fn is_call_permitted(&self) -> Result<(), BreakerError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        Self::prune(&mut inner.window, now, self.config.monitoring_window);

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(BreakerError::Open(self.name.clone()))
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or(now);
                if now.duration_since(opened_at) >= self.config.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(())
                } else {
                    Err(BreakerError::Open(self.name.clone()))
                }
            }
        }
    }

    /// Records a successful call outcome.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.window.push_back(Outcome { at: now, success: true });
        Self::prune(&mut inner.window, now, self.config.monitoring_window);
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
        }
        inner.probe_in_flight = false;
    }

    /// Records a failed call outcome, tripping the breaker if the rolling
    /// failure rate crosses `failure_threshold`.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.window.push_back(Outcome { at: now, success: false });
        Self::prune(&mut inner.window, now, self.config.monitoring_window);
        inner.probe_in_flight = false;

        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            return;
        }

        let calls = inner.window.len();
        if calls >= self.config.minimum_calls {
            let failures = inner.window.iter().filter(|o| !o.success).count();
            let failure_rate = failures as f64 / calls as f64;
            if failure_rate >= self.config.failure_threshold {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
            }
        }
    }

    /// Snapshot of current state for health reporting.
    pub fn status(&self) -> CircuitBreakerStatus {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        Self::prune(&mut inner.window, now, self.config.monitoring_window);
        let calls = inner.window.len();
        let failures = inner.window.iter().filter(|o| !o.success).count();
        let success_rate = if calls == 0 {
            f64::NAN
        } else {
            (calls - failures) as f64 / calls as f64
        };
        CircuitBreakerStatus {
            state: inner.state,
            failures,
            calls,
            success_rate,
            next_attempt_at: inner.opened_at.map(|at| at + self.config.reset_timeout),
        }
    }
}
