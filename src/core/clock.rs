//! Monotonic time sources.
//!
//! The breaker never reads the system clock directly. Every duration it
//! measures and every open-period expiry it checks goes through a [`Clock`],
//! so time-driven transitions can be driven deterministically in tests with
//! [`ManualClock`].

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic time source.
///
/// Implementations must be safe for concurrent reads; the breaker calls
/// [`Clock::now`] from every thread that uses it.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// An arc-wrapped clock for shared ownership.
pub type ArcClock = Arc<dyn Clock>;

/// Measures `later - earlier`, treating a clock that went backwards as zero.
pub fn elapsed_between(earlier: Instant, later: Instant) -> Duration {
    later.saturating_duration_since(earlier)
}

/// The default clock, backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A hand-driven clock for tests.
///
/// The clock starts at the instant it was created and only moves when told
/// to. Clones share the same underlying time, so a test can keep one handle
/// while the breaker owns another.
///
/// # Examples
///
/// ```rust
/// use breakwater::core::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_millis(500));
/// assert_eq!(clock.now() - start, Duration::from_millis(500));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    /// Offset from `origin` in nanoseconds; may go negative after a rewind.
    offset_nanos: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            // Leave headroom so rewinding never underflows `Instant`.
            origin: Instant::now() + Duration::from_secs(3600),
            offset_nanos: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.offset_nanos
            .fetch_add(duration_to_nanos(by), Ordering::SeqCst);
    }

    /// Moves the clock backwards, simulating a misbehaving time source.
    pub fn rewind(&self, by: Duration) {
        self.offset_nanos
            .fetch_sub(duration_to_nanos(by), Ordering::SeqCst);
    }

    /// Returns how far the clock has moved since it was created.
    pub fn elapsed(&self) -> Duration {
        let nanos = self.offset_nanos.load(Ordering::SeqCst);
        Duration::from_nanos(nanos.max(0) as u64)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let nanos = self.offset_nanos.load(Ordering::SeqCst);
        if nanos >= 0 {
            self.origin + Duration::from_nanos(nanos as u64)
        } else {
            self.origin
                .checked_sub(Duration::from_nanos(nanos.unsigned_abs()))
                .unwrap_or(self.origin)
        }
    }
}

fn duration_to_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}
