//! Half-open probe admission.
//!
//! While half-open, only a bounded number of trial calls may be in flight.
//! The counter and the half-open period it belongs to are packed into one
//! `AtomicU64` (generation in the high 32 bits, in-flight count in the low
//! 32), so acquiring, releasing and resetting are all single atomic
//! read-modify-write steps.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const COUNT_MASK: u64 = 0xFFFF_FFFF;

fn pack(generation: u32, in_flight: u32) -> u64 {
    (u64::from(generation) << 32) | u64::from(in_flight)
}

fn unpack(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, (word & COUNT_MASK) as u32)
}

/// Bounded pool of half-open probe slots.
pub struct ProbePermits {
    max: u32,
    word: AtomicU64,
}

impl ProbePermits {
    /// Creates a pool allowing up to `max` concurrent probes.
    pub fn new(max: u32) -> Self {
        Self {
            max: max.max(1),
            word: AtomicU64::new(pack(0, 0)),
        }
    }

    /// Maximum number of concurrent probes.
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Number of probes currently in flight.
    pub fn in_flight(&self) -> u32 {
        unpack(self.word.load(Ordering::Acquire)).1
    }

    /// Starts a new half-open period with every slot free.
    ///
    /// Leases handed out before the reset become stale: releasing them no
    /// longer touches the counter.
    pub fn reset(&self) {
        let mut current = self.word.load(Ordering::Acquire);
        loop {
            let (generation, _) = unpack(current);
            let next = pack(generation.wrapping_add(1), 0);
            match self
                .word
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Takes a probe slot if one is free.
    pub fn try_acquire(&self) -> Option<ProbeLease<'_>> {
        let mut current = self.word.load(Ordering::Acquire);
        loop {
            let (generation, in_flight) = unpack(current);
            if in_flight >= self.max {
                return None;
            }
            let next = pack(generation, in_flight + 1);
            match self
                .word
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    return Some(ProbeLease {
                        permits: self,
                        generation,
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self, lease_generation: u32) {
        let mut current = self.word.load(Ordering::Acquire);
        loop {
            let (generation, in_flight) = unpack(current);
            if generation != lease_generation || in_flight == 0 {
                return;
            }
            let next = pack(generation, in_flight - 1);
            match self
                .word
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

impl fmt::Debug for ProbePermits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (generation, in_flight) = unpack(self.word.load(Ordering::Acquire));
        f.debug_struct("ProbePermits")
            .field("max", &self.max)
            .field("in_flight", &in_flight)
            .field("generation", &generation)
            .finish()
    }
}

/// A held probe slot; the slot is freed when the lease is dropped.
#[must_use = "dropping a lease frees its probe slot immediately"]
pub struct ProbeLease<'a> {
    permits: &'a ProbePermits,
    generation: u32,
}

impl fmt::Debug for ProbeLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeLease")
            .field("generation", &self.generation)
            .finish()
    }
}

impl Drop for ProbeLease<'_> {
    fn drop(&mut self) {
        self.permits.release(self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Barrier;

    #[test]
    fn test_bounded_acquire() {
        let permits = ProbePermits::new(2);
        let a = permits.try_acquire();
        let b = permits.try_acquire();
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(permits.try_acquire().is_none());
        assert_eq!(permits.in_flight(), 2);

        drop(a);
        assert_eq!(permits.in_flight(), 1);
        let c = permits.try_acquire();
        assert!(c.is_some());
        assert!(permits.try_acquire().is_none());
    }

    #[test]
    fn test_stale_lease_does_not_release_new_period() {
        let permits = ProbePermits::new(1);
        let old = permits.try_acquire().unwrap();

        permits.reset();
        let fresh = permits.try_acquire().unwrap();
        assert_eq!(permits.in_flight(), 1);

        // The lease from the previous period must not free the new slot.
        drop(old);
        assert_eq!(permits.in_flight(), 1);
        assert!(permits.try_acquire().is_none());

        drop(fresh);
        assert_eq!(permits.in_flight(), 0);
    }

    #[test]
    fn test_concurrent_burst_never_exceeds_max() {
        const THREADS: usize = 16;
        let permits = ProbePermits::new(3);
        let barrier = Barrier::new(THREADS);
        let peak = AtomicU32::new(0);

        std::thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    barrier.wait();
                    for _ in 0..200 {
                        if let Some(_lease) = permits.try_acquire() {
                            let seen = permits.in_flight();
                            peak.fetch_max(seen, Ordering::SeqCst);
                            assert!(seen <= 3);
                        }
                    }
                });
            }
        });

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(permits.in_flight(), 0);
    }
}
