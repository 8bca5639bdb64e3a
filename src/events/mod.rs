//! Structured breaker events.
//!
//! Breakers report state transitions, recorded outcomes, rejections and
//! fallbacks to an optional [`EventSink`]. Events carry a wall-clock
//! timestamp and serialize with `serde`, so a sink can forward them to any
//! metrics or tracing pipeline without the breaker knowing its format.

mod event;
mod sink;

pub use event::{BreakerEvent, EventKind};
pub use sink::{ArcEventSink, EventSink, NoopSink, TracingSink};

#[cfg(feature = "tokio-runtime")]
pub use sink::ChannelSink;

pub(crate) use sink::SinkDebug;
