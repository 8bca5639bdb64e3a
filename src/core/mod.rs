//! Core types and traits for the breakwater library.
//!
//! This module provides the fundamental building blocks used throughout
//! the library:
//!
//! - [`types`] - Call outcomes and the externally visible circuit state
//! - [`traits`] - The `Operation` and `AsyncOperation` capabilities
//! - [`error`] - Structured error types
//! - [`clock`] - Injectable monotonic time sources

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types at the core level
pub use clock::{ArcClock, Clock, ManualClock, MonotonicClock};
pub use error::{CallError, CallResult, ConfigError, ConfigResult};
pub use traits::{AsyncOperation, Operation};
pub use types::{CircuitState, Outcome};
