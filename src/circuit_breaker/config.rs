//! Circuit breaker policy.

use crate::core::{ConfigError, ConfigResult};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The immutable policy a circuit breaker is built with.
///
/// A policy is validated once, when the breaker is constructed; after that it
/// is never mutated and is read without synchronization.
///
/// Policies can be embedded in a host application's own configuration, since
/// they implement `serde` traits. Durations are expressed in milliseconds and
/// missing fields fall back to [`BreakerPolicy::default`]:
///
/// ```rust
/// use breakwater::circuit_breaker::BreakerPolicy;
/// use std::time::Duration;
///
/// let policy: BreakerPolicy = serde_json::from_str(
///     r#"{ "window_size": 20, "min_samples": 10, "open_duration": 5000 }"#,
/// ).unwrap();
/// assert_eq!(policy.open_duration, Duration::from_secs(5));
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerPolicy {
    /// Capacity of the rolling outcome window.
    pub window_size: u32,

    /// Samples required before rates are acted on while closed.
    pub min_samples: u32,

    /// Samples required before a half-open verdict; defaults to `min_samples`.
    pub half_open_min_samples: Option<u32>,

    /// Failure rate (0.0 to 1.0) at or above which the circuit opens.
    pub failure_rate_threshold: f64,

    /// Slow-call rate (0.0 to 1.0) at or above which the circuit opens.
    pub slow_rate_threshold: f64,

    /// A successful call taking at least this long counts as slow.
    #[serde(with = "duration_ms")]
    pub slow_call_duration: Duration,

    /// How long to keep the circuit open before admitting a probe.
    #[serde(with = "duration_ms")]
    pub open_duration: Duration,

    /// Maximum number of concurrent probes in half-open state.
    pub half_open_max_probes: u32,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            window_size: 100,
            min_samples: 20,
            half_open_min_samples: None,
            failure_rate_threshold: 0.5,
            slow_rate_threshold: 1.0,
            slow_call_duration: Duration::from_secs(60),
            open_duration: Duration::from_secs(30),
            half_open_max_probes: 1,
        }
    }
}

impl BreakerPolicy {
    /// Creates a new policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the window size.
    pub fn with_window_size(mut self, size: u32) -> Self {
        self.window_size = size;
        self
    }

    /// Sets the minimum number of samples evaluated while closed.
    pub fn with_min_samples(mut self, samples: u32) -> Self {
        self.min_samples = samples;
        self
    }

    /// Sets the number of probe samples needed for a half-open verdict.
    pub fn with_half_open_min_samples(mut self, samples: u32) -> Self {
        self.half_open_min_samples = Some(samples);
        self
    }

    /// Sets the failure rate threshold.
    pub fn with_failure_rate_threshold(mut self, threshold: f64) -> Self {
        self.failure_rate_threshold = threshold;
        self
    }

    /// Sets the slow-call rate threshold.
    pub fn with_slow_rate_threshold(mut self, threshold: f64) -> Self {
        self.slow_rate_threshold = threshold;
        self
    }

    /// Sets the duration at which a successful call counts as slow.
    pub fn with_slow_call_duration(mut self, duration: Duration) -> Self {
        self.slow_call_duration = duration;
        self
    }

    /// Sets the open duration.
    pub fn with_open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    /// Sets the maximum number of concurrent half-open probes.
    pub fn with_half_open_max_probes(mut self, max: u32) -> Self {
        self.half_open_max_probes = max;
        self
    }

    /// Returns the effective half-open sample count.
    pub fn effective_half_open_min_samples(&self) -> u32 {
        self.half_open_min_samples.unwrap_or(self.min_samples)
    }

    /// Checks every bound, returning the first violation found.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.window_size < 1 {
            return Err(ConfigError::WindowSize {
                window_size: self.window_size,
            });
        }

        if self.min_samples < 1 || self.min_samples > self.window_size {
            return Err(ConfigError::MinSamples {
                min_samples: self.min_samples,
                window_size: self.window_size,
            });
        }

        let half_open = self.effective_half_open_min_samples();
        if half_open < 1 || half_open > self.window_size {
            return Err(ConfigError::HalfOpenMinSamples {
                half_open_min_samples: half_open,
                window_size: self.window_size,
            });
        }

        check_rate("failure_rate_threshold", self.failure_rate_threshold)?;
        check_rate("slow_rate_threshold", self.slow_rate_threshold)?;

        if self.half_open_max_probes < 1 {
            return Err(ConfigError::MaxProbes {
                max_probes: self.half_open_max_probes,
            });
        }

        Ok(())
    }

    /// Creates a policy that trips early and recovers cautiously.
    ///
    /// This policy:
    /// - Evaluates a short window (20 calls, 10 required)
    /// - Opens at a 25% failure rate or 50% slow-call rate
    /// - Keeps circuits open longer (60 seconds)
    /// - Admits a single probe at a time
    pub fn strict() -> Self {
        Self {
            window_size: 20,
            min_samples: 10,
            half_open_min_samples: Some(5),
            failure_rate_threshold: 0.25,
            slow_rate_threshold: 0.5,
            slow_call_duration: Duration::from_secs(2),
            open_duration: Duration::from_secs(60),
            half_open_max_probes: 1,
        }
    }

    /// Creates a policy that tolerates more trouble before tripping.
    ///
    /// This policy:
    /// - Evaluates a long window (200 calls, 50 required)
    /// - Opens at a 75% failure rate; slow calls never trip it
    /// - Keeps circuits open for a shorter time (10 seconds)
    /// - Allows more probe attempts
    pub fn high_availability() -> Self {
        Self {
            window_size: 200,
            min_samples: 50,
            half_open_min_samples: Some(3),
            failure_rate_threshold: 0.75,
            slow_rate_threshold: 1.0,
            slow_call_duration: Duration::from_secs(60),
            open_duration: Duration::from_secs(10),
            half_open_max_probes: 3,
        }
    }
}

fn check_rate(name: &'static str, value: f64) -> ConfigResult<()> {
    // NaN fails the range check.
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Threshold { name, value })
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
