//! Breaker event types.

use crate::circuit_breaker::{Transition, TransitionReason};
use crate::core::{CircuitState, Outcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Something observable that happened inside a breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerEvent {
    /// Name of the breaker that produced the event.
    pub breaker: String,

    /// Wall-clock time the event was produced.
    pub timestamp: DateTime<Utc>,

    /// What happened.
    #[serde(flatten)]
    pub kind: EventKind,
}

/// The payload of a [`BreakerEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    /// The breaker changed state.
    StateTransition {
        /// State before the change.
        from: CircuitState,
        /// State after the change.
        to: CircuitState,
        /// What caused it.
        reason: TransitionReason,
        /// Failure rate over the window just before it was cleared.
        failure_rate: f64,
        /// Slow-call rate over the window just before it was cleared.
        slow_rate: f64,
        /// Number of outcomes the rates were computed over.
        sample_count: usize,
    },

    /// An admitted call finished and was recorded in the window.
    CallRecorded {
        /// How the call was classified.
        outcome: Outcome,
        /// How long the call took, in milliseconds.
        elapsed_ms: u64,
    },

    /// An admitted call finished after its state had already ended.
    OutcomeIgnored {
        /// How the call was classified.
        outcome: Outcome,
    },

    /// A call was turned away without running.
    CallRejected {
        /// State the breaker was in.
        state: CircuitState,
        /// Time left until a probe will be admitted, in milliseconds.
        retry_after_ms: Option<u64>,
    },

    /// A fallback produced the result of a call.
    FallbackUsed {
        /// `true` if the call was rejected, `false` if it ran and failed.
        rejected: bool,
    },
}

impl BreakerEvent {
    /// Creates an event stamped with the current time.
    pub fn new(breaker: impl Into<String>, kind: EventKind) -> Self {
        Self {
            breaker: breaker.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Creates a state transition event.
    pub fn transition(breaker: impl Into<String>, transition: &Transition) -> Self {
        Self::new(
            breaker,
            EventKind::StateTransition {
                from: transition.from,
                to: transition.to,
                reason: transition.reason,
                failure_rate: transition.stats.failure_rate,
                slow_rate: transition.stats.slow_rate,
                sample_count: transition.stats.sample_count,
            },
        )
    }

    /// Creates an event for a finished call.
    pub fn recorded(breaker: impl Into<String>, outcome: Outcome, elapsed: Duration, recorded: bool) -> Self {
        let kind = if recorded {
            EventKind::CallRecorded {
                outcome,
                elapsed_ms: millis(elapsed),
            }
        } else {
            EventKind::OutcomeIgnored { outcome }
        };
        Self::new(breaker, kind)
    }

    /// Creates an event for a rejected call.
    pub fn rejected(
        breaker: impl Into<String>,
        state: CircuitState,
        retry_after: Option<Duration>,
    ) -> Self {
        Self::new(
            breaker,
            EventKind::CallRejected {
                state,
                retry_after_ms: retry_after.map(millis),
            },
        )
    }

    /// Creates an event for a fallback producing the result.
    pub fn fallback(breaker: impl Into<String>, rejected: bool) -> Self {
        Self::new(breaker, EventKind::FallbackUsed { rejected })
    }

    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            EventKind::StateTransition { .. } => "state_transition",
            EventKind::CallRecorded { .. } => "call_recorded",
            EventKind::OutcomeIgnored { .. } => "outcome_ignored",
            EventKind::CallRejected { .. } => "call_rejected",
            EventKind::FallbackUsed { .. } => "fallback_used",
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
