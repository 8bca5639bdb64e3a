//! The CLOSED / OPEN / HALF_OPEN automaton.
//!
//! The machine is plain data with no synchronization of its own; the
//! breaker owns it behind a single mutex so that recording an outcome,
//! evaluating the window and transitioning happen as one step.
//!
//! Every transition bumps an epoch. An admitted call carries the epoch it was
//! admitted under, and its outcome is only recorded if the machine is still
//! in that epoch when the call finishes. This keeps history from leaking
//! across regimes, and stops probes that were in flight when the circuit
//! reopened from closing it again.

use crate::circuit_breaker::config::BreakerPolicy;
use crate::circuit_breaker::state::{BreakerMetrics, BreakerState, Transition, TransitionReason};
use crate::circuit_breaker::window::{classify, OutcomeWindow, WindowStats};
use crate::core::clock::elapsed_between;
use crate::core::Outcome;

use std::time::{Duration, Instant};

/// Result of asking the machine to admit a call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// The circuit is closed; the call runs unconditionally.
    Pass {
        /// Epoch the call was admitted under.
        epoch: u64,
    },
    /// The circuit is half-open; the call may run if a probe slot is free.
    Probe {
        /// Epoch the call was admitted under.
        epoch: u64,
        /// Set when this very admission moved the circuit out of OPEN.
        entered: Option<Transition>,
    },
    /// The circuit is open; the call must not run.
    Reject {
        /// Time left until the open period ends.
        retry_after: Duration,
    },
}

/// What happened to a finished call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Completion {
    /// How the call was classified.
    pub outcome: Outcome,
    /// `false` if the call's epoch had already ended.
    pub recorded: bool,
    /// The transition the outcome caused, if any.
    pub transition: Option<Transition>,
}

/// The breaker's state, rolling window and counters.
#[derive(Debug)]
pub struct StateMachine {
    policy: BreakerPolicy,
    state: BreakerState,
    window: OutcomeWindow,
    epoch: u64,
    metrics: BreakerMetrics,
}

impl StateMachine {
    /// Creates a closed machine. The policy must already be validated.
    pub fn new(policy: BreakerPolicy) -> Self {
        let window = OutcomeWindow::new(policy.window_size);
        Self {
            policy,
            state: BreakerState::Closed,
            window,
            epoch: 0,
            metrics: BreakerMetrics::new(),
        }
    }

    /// Returns the current state without evaluating time.
    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Returns the current epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns the cumulative counters.
    pub fn metrics(&self) -> &BreakerMetrics {
        &self.metrics
    }

    /// Returns statistics over the current window.
    pub fn stats(&self) -> WindowStats {
        self.window.evaluate()
    }

    /// Decides whether a call attempted at `now` may run.
    ///
    /// An open circuit whose open period has elapsed becomes half-open here,
    /// and the admitting call becomes its first probe.
    pub fn admit(&mut self, now: Instant) -> Admission {
        match self.state {
            BreakerState::Closed => Admission::Pass { epoch: self.epoch },

            BreakerState::Open { opened_at } => {
                let elapsed = elapsed_between(opened_at, now);
                if elapsed >= self.policy.open_duration {
                    let transition =
                        self.transition(BreakerState::HalfOpen, TransitionReason::OpenDurationElapsed);
                    Admission::Probe {
                        epoch: self.epoch,
                        entered: Some(transition),
                    }
                } else {
                    Admission::Reject {
                        retry_after: self.policy.open_duration - elapsed,
                    }
                }
            }

            BreakerState::HalfOpen => Admission::Probe {
                epoch: self.epoch,
                entered: None,
            },
        }
    }

    /// Counts an admitted call.
    pub fn record_admitted(&mut self) {
        self.metrics.record_admitted();
    }

    /// Counts a call that was turned away.
    pub fn record_rejected(&mut self) {
        self.metrics.record_rejected();
    }

    /// Counts a fallback producing the result.
    pub fn record_fallback(&mut self) {
        self.metrics.record_fallback();
    }

    /// Records a finished call and applies any transition it causes.
    pub fn complete(
        &mut self,
        epoch: u64,
        succeeded: bool,
        elapsed: Duration,
        now: Instant,
    ) -> Completion {
        let outcome = classify(succeeded, elapsed, self.policy.slow_call_duration);
        match outcome {
            Outcome::SuccessFast => self.metrics.record_success(),
            Outcome::SuccessSlow => self.metrics.record_slow(),
            Outcome::Failure => self.metrics.record_failure(),
        }

        if epoch != self.epoch || self.state.is_open() {
            self.metrics.record_ignored();
            return Completion {
                outcome,
                recorded: false,
                transition: None,
            };
        }

        self.window.push(outcome);
        let stats = self.window.evaluate();

        let next = match self.state {
            BreakerState::Closed => self.evaluate_closed(&stats, now),
            BreakerState::HalfOpen => self.evaluate_half_open(outcome, &stats, now),
            BreakerState::Open { .. } => None,
        };
        let transition = next.map(|(target, reason)| self.transition(target, reason));

        Completion {
            outcome,
            recorded: true,
            transition,
        }
    }

    fn evaluate_closed(
        &self,
        stats: &WindowStats,
        now: Instant,
    ) -> Option<(BreakerState, TransitionReason)> {
        if !stats.has_min_samples(self.policy.min_samples) {
            return None;
        }
        // A simultaneous breach of both thresholds opens once, reported as a failure breach.
        let reason = if stats.failure_rate >= self.policy.failure_rate_threshold {
            TransitionReason::FailureRateExceeded
        } else if stats.slow_rate >= self.policy.slow_rate_threshold {
            TransitionReason::SlowRateExceeded
        } else {
            return None;
        };
        Some((BreakerState::Open { opened_at: now }, reason))
    }

    fn evaluate_half_open(
        &self,
        outcome: Outcome,
        stats: &WindowStats,
        now: Instant,
    ) -> Option<(BreakerState, TransitionReason)> {
        if outcome.is_failure() {
            return Some((BreakerState::Open { opened_at: now }, TransitionReason::ProbeFailed));
        }
        if !stats.has_min_samples(self.policy.effective_half_open_min_samples()) {
            return None;
        }
        if stats.slow_rate >= self.policy.slow_rate_threshold {
            return Some((BreakerState::Open { opened_at: now }, TransitionReason::ProbesTooSlow));
        }
        if stats.failures == 0 {
            return Some((BreakerState::Closed, TransitionReason::ProbesSucceeded));
        }
        None
    }

    /// Forces the machine into `target`, even if it is already there.
    pub fn force(&mut self, target: BreakerState, reason: TransitionReason) -> Transition {
        self.transition(target, reason)
    }

    /// Returns to a fresh closed machine, clearing the counters too.
    pub fn reset(&mut self) -> Transition {
        let transition = self.transition(BreakerState::Closed, TransitionReason::Reset);
        self.metrics = BreakerMetrics::new();
        transition
    }

    fn transition(&mut self, target: BreakerState, reason: TransitionReason) -> Transition {
        let transition = Transition {
            from: self.state.circuit_state(),
            to: target.circuit_state(),
            reason,
            stats: self.window.evaluate(),
        };

        match (self.state, target) {
            (_, BreakerState::Open { .. }) => self.metrics.record_opened(),
            (BreakerState::HalfOpen, BreakerState::Closed) => self.metrics.record_closed(),
            _ => {}
        }

        self.state = target;
        self.window.clear();
        self.epoch = self.epoch.wrapping_add(1);
        transition
    }
}
