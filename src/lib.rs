//! # Breakwater
//!
//! A rate-based circuit breaker for guarding calls to unreliable dependencies.
//!
//! ## Overview
//!
//! Breakwater sits in front of a remote call and decides, call by call,
//! whether it may run. It lets you:
//!
//! - Classify every admitted call as a fast success, a slow success or a failure
//! - Open the circuit when the failure or slow-call rate over a rolling window crosses a threshold
//! - Fail fast (or serve a fallback) while the circuit is open
//! - Probe recovery with a bounded number of concurrent half-open calls
//! - Observe transitions through `tracing` and pluggable event sinks
//! - Manage many named breakers and report their health
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use breakwater::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let breaker = CircuitBreaker::builder()
//!         .name("inventory")
//!         .policy(
//!             BreakerPolicy::default()
//!                 .with_slow_call_duration(Duration::from_millis(250))
//!                 .with_open_duration(Duration::from_secs(10)),
//!         )
//!         .event_sink(TracingSink)
//!         .build()?;
//!
//!     let stock = breaker
//!         .call_async_with_fallback(
//!             || async { Err::<u32, std::io::Error>(std::io::ErrorKind::TimedOut.into()) },
//!             || async { Ok::<u32, std::io::Error>(0) },
//!         )
//!         .await?;
//!
//!     println!("stock: {stock}, state: {}", breaker.state());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `default` - Includes tokio runtime support
//! - `tokio-runtime` - Channel-backed event sink via tokio
//!
//! ## Architecture
//!
//! The library is organized into several layers:
//!
//! - **Core**: Outcomes, states, clocks, guarded-operation traits and errors
//! - **Circuit Breaker**: Outcome window, state machine, probe admission and the breaker itself
//! - **Events**: Structured events and sinks
//! - **Registry**: Named breakers and health reports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod circuit_breaker;
pub mod core;
pub mod events;
pub mod registry;

// Re-export commonly used types at the crate root
pub use crate::core::{
    AsyncOperation, CallError, CallResult, CircuitState, Clock, ConfigError, ManualClock,
    MonotonicClock, Operation, Outcome,
};

pub use crate::circuit_breaker::{BreakerMetrics, BreakerPolicy, CircuitBreaker, WindowStats};
pub use crate::events::{BreakerEvent, EventKind, EventSink, TracingSink};
pub use crate::registry::{BreakerRegistry, HealthReport};

/// Prelude module for convenient imports.
///
/// ```rust
/// use breakwater::prelude::*;
/// ```
pub mod prelude {
    pub use crate::circuit_breaker::{
        BreakerMetrics, BreakerPolicy, CircuitBreaker, CircuitBreakerBuilder, WindowStats,
    };
    pub use crate::core::{
        AsyncOperation, CallError, CallResult, CircuitState, Clock, ConfigError, ManualClock,
        MonotonicClock, Operation, Outcome,
    };
    pub use crate::events::{BreakerEvent, EventKind, EventSink, NoopSink, TracingSink};
    pub use crate::registry::{BreakerRegistry, HealthReport};
}
