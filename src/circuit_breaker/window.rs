//! Rolling outcome history and the statistics computed over it.

use crate::core::Outcome;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A fixed-capacity ring of recent call outcomes.
///
/// Slots are written at a cursor that advances modulo the capacity, so once
/// the window is full each new outcome overwrites the oldest one. The window
/// is not synchronized itself; the breaker guards it with its state lock.
#[derive(Debug, Clone)]
pub struct OutcomeWindow {
    slots: Vec<Outcome>,
    capacity: usize,
    cursor: usize,
    occupied: usize,
}

impl OutcomeWindow {
    /// Creates an empty window holding up to `capacity` outcomes.
    ///
    /// A zero capacity is bumped to one; policies are validated before they
    /// ever reach here.
    pub fn new(capacity: u32) -> Self {
        let capacity = (capacity as usize).max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
            occupied: 0,
        }
    }

    /// Classifies a finished call and appends it.
    ///
    /// A success taking at least `slow_threshold` is slow; a failure is a
    /// failure no matter how quickly it happened.
    pub fn record(&mut self, succeeded: bool, elapsed: Duration, slow_threshold: Duration) -> Outcome {
        let outcome = classify(succeeded, elapsed, slow_threshold);
        self.push(outcome);
        outcome
    }

    /// Appends an already classified outcome.
    pub fn push(&mut self, outcome: Outcome) {
        if self.slots.len() < self.capacity {
            self.slots.push(outcome);
        } else {
            self.slots[self.cursor] = outcome;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
        if self.occupied < self.capacity {
            self.occupied += 1;
        }
    }

    /// Forgets all recorded outcomes.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.cursor = 0;
        self.occupied = 0;
    }

    /// Number of outcomes currently held.
    pub fn len(&self) -> usize {
        self.occupied
    }

    /// Returns `true` if nothing has been recorded since the last clear.
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Maximum number of outcomes held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Computes failure and slow-call rates over the current contents.
    pub fn evaluate(&self) -> WindowStats {
        let occupied = &self.slots[..self.occupied];
        let failures = occupied.iter().filter(|o| o.is_failure()).count();
        let slow = occupied.iter().filter(|o| o.is_slow()).count();
        WindowStats::from_counts(failures, slow, self.occupied)
    }
}

/// Classifies a finished call.
pub fn classify(succeeded: bool, elapsed: Duration, slow_threshold: Duration) -> Outcome {
    if !succeeded {
        Outcome::Failure
    } else if elapsed >= slow_threshold {
        Outcome::SuccessSlow
    } else {
        Outcome::SuccessFast
    }
}

/// Rates computed over the current window contents.
///
/// Callers must not act on the rates while `sample_count` is below the
/// policy's minimum; sparse traffic would otherwise trip the breaker on a
/// single unlucky call.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WindowStats {
    /// Fraction of recorded calls that failed.
    pub failure_rate: f64,
    /// Fraction of recorded calls that succeeded slowly.
    pub slow_rate: f64,
    /// Number of failures recorded.
    pub failures: usize,
    /// Number of slow successes recorded.
    pub slow_calls: usize,
    /// Number of outcomes the rates were computed over.
    pub sample_count: usize,
}

impl WindowStats {
    fn from_counts(failures: usize, slow_calls: usize, sample_count: usize) -> Self {
        if sample_count == 0 {
            return Self::default();
        }
        Self {
            failure_rate: failures as f64 / sample_count as f64,
            slow_rate: slow_calls as f64 / sample_count as f64,
            failures,
            slow_calls,
            sample_count,
        }
    }

    /// Returns `true` once enough samples exist to act on the rates.
    pub fn has_min_samples(&self, min_samples: u32) -> bool {
        self.sample_count >= min_samples as usize
    }
}
