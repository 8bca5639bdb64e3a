//! Circuit breaker implementation.
//!
//! The circuit breaker pattern prevents cascading failures by temporarily
//! stopping traffic to a failing dependency and letting a bounded number of
//! probe calls through to detect recovery.
//!
//! ## States
//!
//! - **Closed**: Normal operation; calls pass through.
//! - **Open**: The dependency is failing; calls are rejected immediately.
//! - **Half-Open**: Probing the dependency to see if it has recovered.
//!
//! ## Layout
//!
//! - [`OutcomeWindow`] records the last N classified outcomes.
//! - [`StateMachine`] evaluates the window and owns the state.
//! - [`ProbePermits`] bounds concurrent half-open probes.
//! - [`CircuitBreaker`] ties them together behind one guarded `call`.
//!
//! ## Usage
//!
//! ```rust
//! use breakwater::circuit_breaker::{BreakerPolicy, CircuitBreaker};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::builder()
//!     .name("payments")
//!     .policy(
//!         BreakerPolicy::default()
//!             .with_failure_rate_threshold(0.5)
//!             .with_open_duration(Duration::from_secs(30)),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let result = breaker.call(|| -> Result<&str, std::io::Error> { Ok("charged") });
//! assert!(result.is_ok());
//! ```

mod breaker;
mod config;
mod machine;
mod probe;
mod state;
mod window;

pub use breaker::{CircuitBreaker, CircuitBreakerBuilder};
pub use config::BreakerPolicy;
pub use machine::{Admission, Completion, StateMachine};
pub use probe::{ProbeLease, ProbePermits};
pub use state::{BreakerMetrics, BreakerState, Transition, TransitionReason};
pub use window::{classify, OutcomeWindow, WindowStats};
