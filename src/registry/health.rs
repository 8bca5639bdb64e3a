//! Health snapshots.

use crate::circuit_breaker::{BreakerMetrics, CircuitBreaker, WindowStats};
use crate::core::CircuitState;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerHealth {
    /// Breaker name.
    pub name: String,

    /// Current state.
    pub state: CircuitState,

    /// Statistics over the current window.
    pub stats: WindowStats,

    /// Cumulative counters.
    pub metrics: BreakerMetrics,

    /// Half-open probes currently running.
    pub in_flight_probes: u32,
}

impl BreakerHealth {
    /// Captures the current view of `breaker`.
    pub fn capture(breaker: &CircuitBreaker) -> Self {
        Self {
            name: breaker.name().to_string(),
            state: breaker.state(),
            stats: breaker.stats(),
            metrics: breaker.metrics(),
            in_flight_probes: breaker.in_flight_probes(),
        }
    }
}

/// Health of every breaker in a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// When the snapshot was taken.
    pub generated_at: DateTime<Utc>,

    /// Per-breaker views, sorted by name.
    pub breakers: Vec<BreakerHealth>,
}

impl HealthReport {
    /// Builds a report from per-breaker views.
    pub fn new(mut breakers: Vec<BreakerHealth>) -> Self {
        breakers.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            generated_at: Utc::now(),
            breakers,
        }
    }

    /// Returns `true` if every breaker is closed.
    pub fn is_healthy(&self) -> bool {
        self.breakers
            .iter()
            .all(|b| b.state == CircuitState::Closed)
    }

    /// Number of breakers in `state`.
    pub fn count_in(&self, state: CircuitState) -> usize {
        self.breakers.iter().filter(|b| b.state == state).count()
    }

    /// Names of breakers that are not closed.
    pub fn degraded(&self) -> Vec<&str> {
        self.breakers
            .iter()
            .filter(|b| b.state != CircuitState::Closed)
            .map(|b| b.name.as_str())
            .collect()
    }

    /// Looks up one breaker's view by name.
    pub fn get(&self, name: &str) -> Option<&BreakerHealth> {
        self.breakers.iter().find(|b| b.name == name)
    }

    /// Serializes the report as JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes the report as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
