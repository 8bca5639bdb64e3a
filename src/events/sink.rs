//! Event sinks.
//!
//! Sinks are best-effort. The breaker hands events over after it has
//! released its internal lock, and an implementation must return promptly:
//! anything slow belongs on the other side of a channel.

use crate::events::event::{BreakerEvent, EventKind};

use std::fmt;
use std::sync::Arc;

/// Receives breaker events.
pub trait EventSink: Send + Sync {
    /// Accepts one event. Must not block.
    fn emit(&self, event: BreakerEvent);

    /// Returns `false` if events would be discarded anyway.
    ///
    /// The breaker skips building events for disabled sinks.
    fn enabled(&self) -> bool {
        true
    }
}

impl<F> EventSink for F
where
    F: Fn(BreakerEvent) + Send + Sync,
{
    fn emit(&self, event: BreakerEvent) {
        self(event)
    }
}

/// An arc-wrapped sink for shared ownership.
pub type ArcEventSink = Arc<dyn EventSink>;

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: BreakerEvent) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// Writes events as structured `tracing` records.
///
/// Records use the `breakwater::events` target so a subscriber can route
/// them separately from the breaker's own diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: BreakerEvent) {
        match &event.kind {
            EventKind::StateTransition {
                from,
                to,
                reason,
                failure_rate,
                slow_rate,
                sample_count,
            } => {
                tracing::info!(
                    target: "breakwater::events",
                    event_type = "state_transition",
                    breaker = %event.breaker,
                    timestamp = %event.timestamp,
                    from = %from,
                    to = %to,
                    reason = %reason,
                    failure_rate = failure_rate,
                    slow_rate = slow_rate,
                    sample_count = sample_count,
                    "Circuit breaker state changed"
                );
            }
            EventKind::CallRecorded {
                outcome,
                elapsed_ms,
            } => {
                tracing::debug!(
                    target: "breakwater::events",
                    event_type = "call_recorded",
                    breaker = %event.breaker,
                    outcome = %outcome,
                    elapsed_ms = elapsed_ms,
                    "Call recorded"
                );
            }
            EventKind::OutcomeIgnored { outcome } => {
                tracing::debug!(
                    target: "breakwater::events",
                    event_type = "outcome_ignored",
                    breaker = %event.breaker,
                    outcome = %outcome,
                    "Outcome from an earlier state ignored"
                );
            }
            EventKind::CallRejected {
                state,
                retry_after_ms,
            } => {
                tracing::debug!(
                    target: "breakwater::events",
                    event_type = "call_rejected",
                    breaker = %event.breaker,
                    state = %state,
                    retry_after_ms = ?retry_after_ms,
                    "Call rejected"
                );
            }
            EventKind::FallbackUsed { rejected } => {
                tracing::debug!(
                    target: "breakwater::events",
                    event_type = "fallback_used",
                    breaker = %event.breaker,
                    rejected = rejected,
                    "Fallback used"
                );
            }
        }
    }
}

/// Forwards events into a bounded tokio channel.
///
/// When the channel is full or closed the event is dropped and counted;
/// the breaker never waits for a consumer.
#[cfg(feature = "tokio-runtime")]
pub struct ChannelSink {
    sender: tokio::sync::mpsc::Sender<BreakerEvent>,
    dropped: std::sync::atomic::AtomicU64,
}

#[cfg(feature = "tokio-runtime")]
impl ChannelSink {
    /// Creates a sink and the receiver that drains it.
    pub fn new(capacity: usize) -> (Self, tokio::sync::mpsc::Receiver<BreakerEvent>) {
        let (sender, receiver) = tokio::sync::mpsc::channel(capacity.max(1));
        (Self::from_sender(sender), receiver)
    }

    /// Wraps an existing sender.
    pub fn from_sender(sender: tokio::sync::mpsc::Sender<BreakerEvent>) -> Self {
        Self {
            sender,
            dropped: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Number of events dropped because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(feature = "tokio-runtime")]
impl EventSink for ChannelSink {
    fn emit(&self, event: BreakerEvent) {
        if self.sender.try_send(event).is_err() {
            self.dropped
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    fn enabled(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(feature = "tokio-runtime")]
impl fmt::Debug for ChannelSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSink")
            .field("capacity", &self.sender.max_capacity())
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Debug helper for structs holding a type-erased sink.
pub(crate) struct SinkDebug<'a>(pub &'a dyn EventSink);

impl fmt::Debug for SinkDebug<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.enabled() {
            f.write_str("EventSink(enabled)")
        } else {
            f.write_str("EventSink(disabled)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CircuitState;
    use std::sync::Mutex;

    #[test]
    fn test_noop_sink_is_disabled() {
        assert!(!NoopSink.enabled());
        assert!(TracingSink.enabled());
    }

    #[test]
    fn test_closure_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |event: BreakerEvent| seen.lock().unwrap().push(event.event_type());

        sink.emit(BreakerEvent::fallback("db", true));
        sink.emit(BreakerEvent::rejected("db", CircuitState::Open, None));
        assert_eq!(*seen.lock().unwrap(), vec!["fallback_used", "call_rejected"]);
    }

    #[test]
    fn test_tracing_sink_accepts_every_kind() {
        let sink = TracingSink;
        sink.emit(BreakerEvent::fallback("db", false));
        sink.emit(BreakerEvent::rejected("db", CircuitState::HalfOpen, None));
    }

    #[cfg(feature = "tokio-runtime")]
    #[tokio::test]
    async fn test_channel_sink_drops_when_full() {
        let (sink, mut receiver) = ChannelSink::new(1);
        sink.emit(BreakerEvent::fallback("db", true));
        sink.emit(BreakerEvent::fallback("db", false));
        assert_eq!(sink.dropped(), 1);

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::FallbackUsed { rejected: true });

        drop(receiver);
        assert!(!sink.enabled());
    }
}
