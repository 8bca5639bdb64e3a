//! Named breakers and health reporting.
//!
//! A service usually guards several dependencies, one breaker each. The
//! [`BreakerRegistry`] hands out breakers by name, shares a default policy,
//! clock and event sink between them, and produces a [`HealthReport`]
//! snapshot for health endpoints.

mod breakers;
mod health;

pub use breakers::{BreakerRegistry, BreakerRegistryBuilder};
pub use health::{BreakerHealth, HealthReport};
