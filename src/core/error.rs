//! Error types for the breakwater library.
//!
//! Two families of errors exist. [`ConfigError`] is raised once, when a
//! breaker is built from an invalid policy, and is never recovered from.
//! [`CallError`] is returned from every guarded call and keeps a denied call
//! distinguishable from a genuine failure of the wrapped operation.

use std::time::Duration;
use thiserror::Error;

/// An invalid breaker policy was supplied at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The rolling window must hold at least one outcome.
    #[error("window size must be at least 1, got {window_size}")]
    WindowSize {
        /// The rejected window size.
        window_size: u32,
    },

    /// The minimum sample count must lie in `1..=window_size`.
    #[error("minimum samples must be in 1..={window_size}, got {min_samples}")]
    MinSamples {
        /// The rejected minimum sample count.
        min_samples: u32,
        /// The configured window size.
        window_size: u32,
    },

    /// The half-open sample count must lie in `1..=window_size`.
    #[error("half-open minimum samples must be in 1..={window_size}, got {half_open_min_samples}")]
    HalfOpenMinSamples {
        /// The rejected half-open sample count.
        half_open_min_samples: u32,
        /// The configured window size.
        window_size: u32,
    },

    /// A rate threshold lies outside `[0, 1]` or is not a number.
    #[error("{name} must be within [0, 1], got {value}")]
    Threshold {
        /// Which threshold was rejected.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// At least one half-open probe must be allowed.
    #[error("half-open max probes must be at least 1, got {max_probes}")]
    MaxProbes {
        /// The rejected probe count.
        max_probes: u32,
    },
}

/// The error returned from a guarded call.
///
/// `E` is the error type of the wrapped operation, passed through verbatim.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The breaker denied the call and no fallback was supplied.
    ///
    /// The wrapped operation was never invoked.
    #[error("circuit breaker '{breaker}' is open")]
    CircuitOpen {
        /// Name of the breaker that rejected the call.
        breaker: String,
        /// Time left until the breaker will admit a probe, when known.
        retry_after: Option<Duration>,
    },

    /// The wrapped operation itself failed.
    #[error("guarded operation failed: {0}")]
    Operation(E),
}

impl<E> CallError<E> {
    /// Creates a `CircuitOpen` error.
    pub fn circuit_open(breaker: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::CircuitOpen {
            breaker: breaker.into(),
            retry_after,
        }
    }

    /// Returns `true` if the call was rejected without running.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Returns `true` if the wrapped operation ran and failed.
    pub fn is_operation(&self) -> bool {
        matches!(self, Self::Operation(_))
    }

    /// Returns the wrapped operation's error, if this is one.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::CircuitOpen { .. } => None,
        }
    }

    /// Consumes the error, returning the wrapped operation's error if any.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::CircuitOpen { .. } => None,
        }
    }

    /// Returns the retry hint of a rejected call.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => *retry_after,
            Self::Operation(_) => None,
        }
    }
}

/// A specialized `Result` type for breaker construction.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A specialized `Result` type for guarded calls.
pub type CallResult<T, E> = Result<T, CallError<E>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MinSamples {
            min_samples: 12,
            window_size: 10,
        };
        assert!(err.to_string().contains("1..=10"));
        assert!(err.to_string().contains("12"));

        let err = ConfigError::Threshold {
            name: "failure_rate_threshold",
            value: 1.5,
        };
        assert_eq!(
            err.to_string(),
            "failure_rate_threshold must be within [0, 1], got 1.5"
        );
    }

    #[test]
    fn test_call_error_kinds() {
        let open: CallError<std::io::Error> =
            CallError::circuit_open("db", Some(Duration::from_millis(250)));
        assert!(open.is_circuit_open());
        assert!(!open.is_operation());
        assert_eq!(open.retry_after(), Some(Duration::from_millis(250)));
        assert!(open.into_operation().is_none());

        let failed: CallError<std::io::Error> =
            CallError::Operation(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(failed.is_operation());
        assert_eq!(failed.operation_error().map(|e| e.to_string()), Some("boom".into()));
        assert_eq!(failed.to_string(), "guarded operation failed: boom");
    }
}
