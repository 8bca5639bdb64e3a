//! Core types used throughout the breakwater library.
//!
//! This module defines the vocabulary shared by the window, the state
//! machine and the event sinks: how a single call was classified and which
//! regime the breaker is currently in.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The classified result of a single guarded call.
///
/// Outcomes have no identity beyond their position in the rolling window:
/// - `SuccessFast`: the call succeeded below the slow-call threshold
/// - `SuccessSlow`: the call succeeded but took at least the slow-call threshold
/// - `Failure`: the call failed, regardless of how long it took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The call succeeded quickly.
    SuccessFast,

    /// The call succeeded, but slowly.
    SuccessSlow,

    /// The call failed.
    Failure,
}

impl Outcome {
    /// Returns `true` for either kind of success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::SuccessFast | Self::SuccessSlow)
    }

    /// Returns `true` if the call was slow.
    pub fn is_slow(&self) -> bool {
        matches!(self, Self::SuccessSlow)
    }

    /// Returns `true` if the call failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }

    /// Returns the name of the outcome.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SuccessFast => "success_fast",
            Self::SuccessSlow => "success_slow",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The externally visible regime of a circuit breaker.
///
/// This is the read-only view handed out for health displays; the
/// state machine keeps its own richer representation internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation; calls pass through.
    Closed,
    /// The dependency is failing; calls are rejected without running.
    Open,
    /// A bounded number of probe calls test whether the dependency recovered.
    HalfOpen,
}

impl CircuitState {
    /// Returns the name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_predicates() {
        assert!(Outcome::SuccessFast.is_success());
        assert!(Outcome::SuccessSlow.is_success());
        assert!(Outcome::SuccessSlow.is_slow());
        assert!(!Outcome::SuccessFast.is_slow());
        assert!(Outcome::Failure.is_failure());
        assert!(!Outcome::Failure.is_success());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::Open.to_string(), "open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&CircuitState::HalfOpen).unwrap();
        assert_eq!(json, "\"half_open\"");

        let outcome: Outcome = serde_json::from_str("\"success_slow\"").unwrap();
        assert_eq!(outcome, Outcome::SuccessSlow);
    }
}
