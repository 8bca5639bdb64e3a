//! Circuit breaker state and counters.

use crate::circuit_breaker::window::WindowStats;
use crate::core::CircuitState;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// The internal state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Circuit is closed; requests pass through normally.
    Closed,

    /// Circuit is open; requests are rejected.
    Open {
        /// When the circuit was opened.
        opened_at: Instant,
    },

    /// Circuit is half-open; a bounded number of probes are let through.
    HalfOpen,
}

impl BreakerState {
    /// Returns `true` if the circuit is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if the circuit is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Returns `true` if the circuit is half-open.
    pub fn is_half_open(&self) -> bool {
        matches!(self, Self::HalfOpen)
    }

    /// Returns when the circuit opened, if it is open.
    pub fn opened_at(&self) -> Option<Instant> {
        match self {
            Self::Open { opened_at } => Some(*opened_at),
            _ => None,
        }
    }

    /// Returns the externally visible state.
    pub fn circuit_state(&self) -> CircuitState {
        match self {
            Self::Closed => CircuitState::Closed,
            Self::Open { .. } => CircuitState::Open,
            Self::HalfOpen => CircuitState::HalfOpen,
        }
    }

    /// Returns the name of the state.
    pub fn name(&self) -> &'static str {
        self.circuit_state().name()
    }
}

impl Default for BreakerState {
    fn default() -> Self {
        Self::Closed
    }
}

/// Why a state transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// The failure rate reached its threshold while closed.
    FailureRateExceeded,
    /// The slow-call rate reached its threshold while closed.
    SlowRateExceeded,
    /// The open period elapsed and a call asked to be admitted.
    OpenDurationElapsed,
    /// A half-open probe failed.
    ProbeFailed,
    /// Half-open probes were too slow.
    ProbesTooSlow,
    /// Enough half-open probes succeeded.
    ProbesSucceeded,
    /// The circuit was opened by hand.
    ForcedOpen,
    /// The circuit was closed by hand.
    ForcedClosed,
    /// The breaker was reset.
    Reset,
}

impl TransitionReason {
    /// Returns the name of the reason.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FailureRateExceeded => "failure_rate_exceeded",
            Self::SlowRateExceeded => "slow_rate_exceeded",
            Self::OpenDurationElapsed => "open_duration_elapsed",
            Self::ProbeFailed => "probe_failed",
            Self::ProbesTooSlow => "probes_too_slow",
            Self::ProbesSucceeded => "probes_succeeded",
            Self::ForcedOpen => "forced_open",
            Self::ForcedClosed => "forced_closed",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A completed state change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    /// State before the change.
    pub from: CircuitState,
    /// State after the change.
    pub to: CircuitState,
    /// What caused it.
    pub reason: TransitionReason,
    /// Window statistics just before the window was cleared.
    pub stats: WindowStats,
}

/// Metrics about circuit breaker behavior.
///
/// Unlike the rolling window these counters are cumulative: they are never
/// cleared by state transitions, only by [`CircuitBreaker::reset`].
///
/// [`CircuitBreaker::reset`]: crate::circuit_breaker::CircuitBreaker::reset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerMetrics {
    /// Total number of call attempts, admitted or not.
    pub total_requests: u64,
    /// Number of calls that succeeded quickly.
    pub successful_requests: u64,
    /// Number of calls that succeeded slowly.
    pub slow_requests: u64,
    /// Number of calls that failed.
    pub failed_requests: u64,
    /// Number of calls rejected without running.
    pub rejected_requests: u64,
    /// Number of times a fallback produced the result.
    pub fallback_invocations: u64,
    /// Outcomes that finished after the state they were admitted in had ended.
    pub ignored_outcomes: u64,
    /// Number of times the circuit has opened.
    pub times_opened: u64,
    /// Number of times the circuit has closed from half-open.
    pub times_closed: u64,
}

impl BreakerMetrics {
    /// Creates new empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an admitted request.
    pub fn record_admitted(&mut self) {
        self.total_requests += 1;
    }

    /// Records a fast successful request.
    pub fn record_success(&mut self) {
        self.successful_requests += 1;
    }

    /// Records a slow successful request.
    pub fn record_slow(&mut self) {
        self.slow_requests += 1;
    }

    /// Records a failed request.
    pub fn record_failure(&mut self) {
        self.failed_requests += 1;
    }

    /// Records a rejected request.
    pub fn record_rejected(&mut self) {
        self.total_requests += 1;
        self.rejected_requests += 1;
    }

    /// Records that a fallback was used.
    pub fn record_fallback(&mut self) {
        self.fallback_invocations += 1;
    }

    /// Records an outcome dropped because its state had already ended.
    pub fn record_ignored(&mut self) {
        self.ignored_outcomes += 1;
    }

    /// Records that the circuit opened.
    pub fn record_opened(&mut self) {
        self.times_opened += 1;
    }

    /// Records that the circuit closed.
    pub fn record_closed(&mut self) {
        self.times_closed += 1;
    }

    /// Number of admitted calls that have finished.
    pub fn completed_requests(&self) -> u64 {
        self.successful_requests + self.slow_requests + self.failed_requests
    }

    /// Returns the success rate (0.0 to 1.0) over completed calls.
    pub fn success_rate(&self) -> f64 {
        let completed = self.completed_requests();
        if completed == 0 {
            return 1.0;
        }
        (self.successful_requests + self.slow_requests) as f64 / completed as f64
    }

    /// Returns the failure rate (0.0 to 1.0) over completed calls.
    pub fn failure_rate(&self) -> f64 {
        let completed = self.completed_requests();
        if completed == 0 {
            return 0.0;
        }
        self.failed_requests as f64 / completed as f64
    }
}
