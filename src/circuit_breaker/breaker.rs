//! Circuit breaker implementation.

use crate::circuit_breaker::config::BreakerPolicy;
use crate::circuit_breaker::machine::{Admission, StateMachine};
use crate::circuit_breaker::probe::{ProbeLease, ProbePermits};
use crate::circuit_breaker::state::{BreakerMetrics, BreakerState, Transition, TransitionReason};
use crate::circuit_breaker::window::WindowStats;
use crate::core::clock::elapsed_between;
use crate::core::{
    ArcClock, AsyncOperation, CallError, CallResult, CircuitState, Clock, ConfigResult,
    MonotonicClock, Operation,
};
use crate::events::{ArcEventSink, BreakerEvent, EventSink, NoopSink, SinkDebug};

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// A circuit breaker guarding calls to one dependency.
///
/// The breaker watches the outcomes of the calls it admits and stops
/// admitting them when the dependency looks unhealthy, so callers fail fast
/// instead of piling onto something that is already struggling.
///
/// # States
///
/// - **Closed**: Normal operation. Calls pass through and their outcomes fill
///   a rolling window. Once the window holds enough samples, a failure rate or
///   slow-call rate at or above its threshold opens the circuit.
/// - **Open**: Calls are rejected immediately without running. The first call
///   attempted after the open duration moves the circuit to half-open.
/// - **Half-Open**: A bounded number of concurrent probe calls are let
///   through. A single failed probe reopens the circuit; enough clean probes
///   close it.
///
/// There is no background timer: every transition happens inline, on the
/// thread that admits or completes a call. The breaker is `Send + Sync` and
/// is usually shared behind an `Arc`.
///
/// # Example
///
/// ```rust
/// use breakwater::circuit_breaker::{BreakerPolicy, CircuitBreaker};
/// use std::time::Duration;
///
/// let policy = BreakerPolicy::new()
///     .with_window_size(10)
///     .with_min_samples(5)
///     .with_open_duration(Duration::from_secs(1));
/// let breaker = CircuitBreaker::new(policy).unwrap();
///
/// let value = breaker
///     .call(|| -> Result<u32, std::io::Error> { Ok(42) })
///     .unwrap();
/// assert_eq!(value, 42);
///
/// // A fallback absorbs both rejections and failures.
/// let value = breaker.call_with_fallback(
///     || -> Result<u32, std::io::Error> { Err(std::io::ErrorKind::TimedOut.into()) },
///     || Ok::<u32, std::io::Error>(0),
/// );
/// assert_eq!(value.unwrap(), 0);
/// ```
pub struct CircuitBreaker {
    /// Name used in errors, logs and events.
    name: String,
    /// Validated policy.
    policy: BreakerPolicy,
    /// State, window and counters.
    machine: Mutex<StateMachine>,
    /// Half-open probe slots.
    probes: ProbePermits,
    /// Time source.
    clock: ArcClock,
    /// Event receiver.
    sink: ArcEventSink,
}

impl CircuitBreaker {
    /// Creates a breaker with the given policy, the system clock and no event sink.
    pub fn new(policy: BreakerPolicy) -> ConfigResult<Self> {
        Self::builder().policy(policy).build()
    }

    /// Returns a builder for configuring a breaker.
    pub fn builder() -> CircuitBreakerBuilder {
        CircuitBreakerBuilder::new()
    }

    pub(crate) fn from_parts(name: String, policy: BreakerPolicy, clock: ArcClock, sink: ArcEventSink) -> Self {
        Self {
            name,
            machine: Mutex::new(StateMachine::new(policy.clone())),
            probes: ProbePermits::new(policy.half_open_max_probes),
            policy,
            clock,
            sink,
        }
    }

    /// Returns the breaker's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a reference to the policy.
    pub fn policy(&self) -> &BreakerPolicy {
        &self.policy
    }

    /// Returns the current state.
    ///
    /// This is a read-only view: an open circuit whose open period has
    /// elapsed still reports `Open` until a call asks to be admitted.
    pub fn state(&self) -> CircuitState {
        self.lock().state().circuit_state()
    }

    /// Returns a copy of the cumulative metrics.
    pub fn metrics(&self) -> BreakerMetrics {
        self.lock().metrics().clone()
    }

    /// Returns statistics over the current rolling window.
    pub fn stats(&self) -> WindowStats {
        self.lock().stats()
    }

    /// Number of half-open probes currently running.
    pub fn in_flight_probes(&self) -> u32 {
        self.probes.in_flight()
    }

    /// Forces the circuit into the open state.
    ///
    /// The open period starts now, exactly as if the circuit had tripped.
    pub fn force_open(&self) {
        let now = self.clock.now();
        let transition = self.lock().force(
            BreakerState::Open { opened_at: now },
            TransitionReason::ForcedOpen,
        );
        self.on_transition(&transition);
    }

    /// Forces the circuit into the closed state.
    pub fn force_close(&self) {
        let transition = self
            .lock()
            .force(BreakerState::Closed, TransitionReason::ForcedClosed);
        self.on_transition(&transition);
    }

    /// Resets the circuit breaker state and metrics.
    pub fn reset(&self) {
        let transition = self.lock().reset();
        self.on_transition(&transition);
    }

    /// Runs `operation` if the breaker admits it.
    ///
    /// # Errors
    ///
    /// - `CallError::CircuitOpen` if the call was rejected; `operation` never ran.
    /// - `CallError::Operation` carrying the operation's own error.
    pub fn call<O>(&self, operation: O) -> CallResult<O::Output, O::Error>
    where
        O: Operation,
    {
        self.execute(operation, None::<O>)
    }

    /// Runs `operation` if admitted, substituting `fallback` on rejection or failure.
    ///
    /// A rejected call never counts as an outcome. A failed call is recorded
    /// before the fallback runs. If the fallback itself fails, its error is
    /// returned as `CallError::Operation`.
    pub fn call_with_fallback<O, F>(
        &self,
        operation: O,
        fallback: F,
    ) -> CallResult<O::Output, O::Error>
    where
        O: Operation,
        F: Operation<Output = O::Output, Error = O::Error>,
    {
        self.execute(operation, Some(fallback))
    }

    /// Runs an asynchronous `operation` if the breaker admits it.
    ///
    /// If the returned future is dropped while the operation is still running,
    /// the call is recorded as a failure.
    pub async fn call_async<O>(&self, operation: O) -> CallResult<O::Output, O::Error>
    where
        O: AsyncOperation,
    {
        self.execute_async(operation, None::<O>).await
    }

    /// Asynchronous counterpart of [`call_with_fallback`](Self::call_with_fallback).
    pub async fn call_async_with_fallback<O, F>(
        &self,
        operation: O,
        fallback: F,
    ) -> CallResult<O::Output, O::Error>
    where
        O: AsyncOperation,
        F: AsyncOperation<Output = O::Output, Error = O::Error>,
    {
        self.execute_async(operation, Some(fallback)).await
    }

    fn execute<O, F>(&self, operation: O, fallback: Option<F>) -> CallResult<O::Output, O::Error>
    where
        O: Operation,
        F: Operation<Output = O::Output, Error = O::Error>,
    {
        let permit = match self.try_admit() {
            Ok(permit) => permit,
            Err(rejection) => {
                return match fallback {
                    Some(fallback) => {
                        self.on_fallback(true);
                        fallback.invoke().map_err(CallError::Operation)
                    }
                    None => Err(rejection.into_error(&self.name)),
                };
            }
        };

        match operation.invoke() {
            Ok(value) => {
                permit.finish(true);
                Ok(value)
            }
            Err(error) => {
                permit.finish(false);
                match fallback {
                    Some(fallback) => {
                        self.on_fallback(false);
                        fallback.invoke().map_err(CallError::Operation)
                    }
                    None => Err(CallError::Operation(error)),
                }
            }
        }
    }

    async fn execute_async<O, F>(
        &self,
        operation: O,
        fallback: Option<F>,
    ) -> CallResult<O::Output, O::Error>
    where
        O: AsyncOperation,
        F: AsyncOperation<Output = O::Output, Error = O::Error>,
    {
        let permit = match self.try_admit() {
            Ok(permit) => permit,
            Err(rejection) => {
                return match fallback {
                    Some(fallback) => {
                        self.on_fallback(true);
                        fallback.invoke().await.map_err(CallError::Operation)
                    }
                    None => Err(rejection.into_error(&self.name)),
                };
            }
        };

        match operation.invoke().await {
            Ok(value) => {
                permit.finish(true);
                Ok(value)
            }
            Err(error) => {
                permit.finish(false);
                match fallback {
                    Some(fallback) => {
                        self.on_fallback(false);
                        fallback.invoke().await.map_err(CallError::Operation)
                    }
                    None => Err(CallError::Operation(error)),
                }
            }
        }
    }

    /// Checks if a call should be allowed through.
    fn try_admit(&self) -> Result<Permit<'_>, Rejection> {
        let now = self.clock.now();
        let mut entered = None;

        let admitted = {
            let mut machine = self.lock();
            match machine.admit(now) {
                Admission::Pass { epoch } => {
                    machine.record_admitted();
                    Ok((epoch, None))
                }
                Admission::Probe { epoch, entered: transition } => {
                    if transition.is_some() {
                        self.probes.reset();
                        entered = transition;
                    }
                    match self.probes.try_acquire() {
                        Some(lease) => {
                            machine.record_admitted();
                            Ok((epoch, Some(lease)))
                        }
                        None => {
                            machine.record_rejected();
                            Err(Rejection {
                                state: CircuitState::HalfOpen,
                                retry_after: None,
                            })
                        }
                    }
                }
                Admission::Reject { retry_after } => {
                    machine.record_rejected();
                    Err(Rejection {
                        state: CircuitState::Open,
                        retry_after: Some(retry_after),
                    })
                }
            }
        };

        if let Some(transition) = &entered {
            self.on_transition(transition);
        }

        match admitted {
            Ok((epoch, lease)) => Ok(Permit {
                breaker: self,
                epoch,
                started: now,
                _lease: lease,
                finished: false,
            }),
            Err(rejection) => {
                tracing::debug!(
                    breaker = %self.name,
                    state = %rejection.state,
                    retry_after = ?rejection.retry_after,
                    "Circuit breaker rejected call"
                );
                self.emit(|| BreakerEvent::rejected(&self.name, rejection.state, rejection.retry_after));
                Err(rejection)
            }
        }
    }

    /// Records a finished call.
    fn complete(&self, epoch: u64, succeeded: bool, started: Instant) {
        let now = self.clock.now();
        let elapsed = elapsed_between(started, now);
        let completion = self.lock().complete(epoch, succeeded, elapsed, now);

        self.emit(|| {
            BreakerEvent::recorded(&self.name, completion.outcome, elapsed, completion.recorded)
        });
        if let Some(transition) = &completion.transition {
            self.on_transition(transition);
        }
    }

    fn on_fallback(&self, rejected: bool) {
        self.lock().record_fallback();
        self.emit(|| BreakerEvent::fallback(&self.name, rejected));
    }

    fn on_transition(&self, transition: &Transition) {
        if transition.to == CircuitState::Open {
            tracing::warn!(
                breaker = %self.name,
                from = %transition.from,
                to = %transition.to,
                reason = %transition.reason,
                failure_rate = transition.stats.failure_rate,
                slow_rate = transition.stats.slow_rate,
                samples = transition.stats.sample_count,
                "Circuit breaker opened"
            );
        } else {
            tracing::info!(
                breaker = %self.name,
                from = %transition.from,
                to = %transition.to,
                reason = %transition.reason,
                samples = transition.stats.sample_count,
                "Circuit breaker state changed"
            );
        }
        self.emit(|| BreakerEvent::transition(&self.name, transition));
    }

    fn emit(&self, build: impl FnOnce() -> BreakerEvent) {
        if self.sink.enabled() {
            self.sink.emit(build());
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateMachine> {
        self.machine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.lock().state())
            .field("probes", &self.probes)
            .field("policy", &self.policy)
            .field("clock", &self.clock)
            .field("sink", &SinkDebug(self.sink.as_ref()))
            .finish()
    }
}

/// Builder for creating a `CircuitBreaker`.
pub struct CircuitBreakerBuilder {
    name: String,
    policy: BreakerPolicy,
    clock: ArcClock,
    sink: ArcEventSink,
}

impl CircuitBreakerBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            name: "circuit-breaker".to_string(),
            policy: BreakerPolicy::default(),
            clock: Arc::new(MonotonicClock),
            sink: Arc::new(NoopSink),
        }
    }

    /// Sets the name used in errors, logs and events.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the policy.
    pub fn policy(mut self, policy: BreakerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the time source.
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Sets a shared time source.
    pub fn shared_clock(mut self, clock: ArcClock) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the event sink.
    pub fn event_sink<S: EventSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Sets a shared event sink.
    pub fn shared_event_sink(mut self, sink: ArcEventSink) -> Self {
        self.sink = sink;
        self
    }

    /// Builds the breaker.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the policy violates any of its bounds.
    pub fn build(self) -> ConfigResult<CircuitBreaker> {
        self.policy.validate()?;

        tracing::debug!(
            breaker = %self.name,
            window_size = self.policy.window_size,
            min_samples = self.policy.min_samples,
            open_duration = ?self.policy.open_duration,
            "Circuit breaker created"
        );

        Ok(CircuitBreaker::from_parts(
            self.name,
            self.policy,
            self.clock,
            self.sink,
        ))
    }
}

impl Default for CircuitBreakerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CircuitBreakerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerBuilder")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Why a call was turned away.
#[derive(Debug, Clone, Copy)]
struct Rejection {
    state: CircuitState,
    retry_after: Option<Duration>,
}

impl Rejection {
    fn into_error<E>(self, breaker: &str) -> CallError<E> {
        CallError::circuit_open(breaker, self.retry_after)
    }
}

/// An admitted call that has not finished yet.
///
/// If the permit is dropped without [`Permit::finish`], because the
/// operation panicked or its future was cancelled, the call is recorded as
/// a failure. The probe lease, if any, is released after the outcome is
/// recorded.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    epoch: u64,
    started: Instant,
    _lease: Option<ProbeLease<'a>>,
    finished: bool,
}

impl Permit<'_> {
    fn finish(mut self, succeeded: bool) {
        self.finished = true;
        self.breaker.complete(self.epoch, succeeded, self.started);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.breaker.complete(self.epoch, false, self.started);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConfigError, ManualClock, Outcome};
    use crate::events::EventKind;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    type TestResult = Result<&'static str, String>;

    fn ok() -> TestResult {
        Ok("ok")
    }

    fn fail() -> TestResult {
        Err("boom".to_string())
    }

    fn cached() -> TestResult {
        Ok("cached")
    }

    fn fallback_down() -> TestResult {
        Err("fallback down".to_string())
    }

    fn spec_policy() -> BreakerPolicy {
        BreakerPolicy::new()
            .with_window_size(10)
            .with_min_samples(5)
            .with_failure_rate_threshold(0.5)
            .with_slow_rate_threshold(0.5)
            .with_slow_call_duration(Duration::from_millis(100))
            .with_open_duration(Duration::from_millis(1000))
            .with_half_open_max_probes(2)
    }

    fn breaker_with(policy: BreakerPolicy) -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::builder()
            .name("test")
            .policy(policy)
            .clock(clock.clone())
            .build()
            .unwrap();
        (breaker, clock)
    }

    fn trip(breaker: &CircuitBreaker) {
        for _ in 0..3 {
            let _ = breaker.call(fail);
        }
        for _ in 0..2 {
            let _ = breaker.call(ok);
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_circuit_breaker_passes_through() {
        let (breaker, _clock) = breaker_with(spec_policy());

        assert_eq!(breaker.call(ok).unwrap(), "ok");
        assert_eq!(breaker.state(), CircuitState::Closed);

        let metrics = breaker.metrics();
        assert_eq!(metrics.total_requests, 1);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(breaker.stats().sample_count, 1);
    }

    #[test]
    fn test_builder_rejects_invalid_policy() {
        let err = CircuitBreaker::new(spec_policy().with_min_samples(11)).unwrap_err();
        assert!(matches!(err, ConfigError::MinSamples { .. }));

        let err = CircuitBreaker::builder()
            .policy(spec_policy().with_half_open_max_probes(0))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MaxProbes { .. }));
    }

    #[test]
    fn test_never_trips_below_min_samples() {
        let (breaker, _clock) = breaker_with(spec_policy());
        for _ in 0..4 {
            let err = breaker.call(fail).unwrap_err();
            assert!(err.is_operation());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().failure_rate, 1.0);
    }

    #[test]
    fn test_circuit_opens_on_failure_rate() {
        let (breaker, _clock) = breaker_with(spec_policy());
        trip(&breaker);

        assert_eq!(breaker.stats().sample_count, 0);
        assert_eq!(breaker.metrics().times_opened, 1);
    }

    #[test]
    fn test_circuit_opens_on_slow_calls() {
        let (breaker, clock) = breaker_with(spec_policy());
        for _ in 0..5 {
            let result = breaker.call(|| {
                clock.advance(Duration::from_millis(100));
                ok()
            });
            assert!(result.is_ok());
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.metrics().slow_requests, 5);
    }

    #[test]
    fn test_open_circuit_rejects_without_running() {
        let (breaker, clock) = breaker_with(spec_policy());
        trip(&breaker);
        clock.advance(Duration::from_millis(500));

        let ran = AtomicBool::new(false);
        let result = breaker.call(|| {
            ran.store(true, Ordering::SeqCst);
            ok()
        });

        assert!(!ran.load(Ordering::SeqCst));
        let err = result.unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(err.retry_after(), Some(Duration::from_millis(500)));
        assert_eq!(breaker.metrics().rejected_requests, 1);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_elapsed_open_duration_admits_first_probe() {
        let (breaker, clock) = breaker_with(spec_policy());
        trip(&breaker);
        clock.advance(Duration::from_millis(1000));

        // Reading the state does not move the circuit.
        assert_eq!(breaker.state(), CircuitState::Open);

        let result = breaker.call(|| {
            assert_eq!(breaker.state(), CircuitState::HalfOpen);
            assert_eq!(breaker.in_flight_probes(), 1);
            ok()
        });
        assert!(result.is_ok());
        assert_eq!(breaker.in_flight_probes(), 0);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_bounds_concurrent_probes() {
        let (breaker, clock) = breaker_with(spec_policy());
        trip(&breaker);
        clock.advance(Duration::from_millis(1000));

        let result = breaker.call(|| {
            let inner = breaker.call(|| {
                assert_eq!(breaker.in_flight_probes(), 2);
                let third = breaker.call(ok);
                assert!(third.unwrap_err().is_circuit_open());
                ok()
            });
            assert!(inner.is_ok());

            // Probe B finished, so a slot is free again.
            assert_eq!(breaker.in_flight_probes(), 1);
            assert!(breaker.call(ok).is_ok());
            ok()
        });

        assert!(result.is_ok());
        assert_eq!(breaker.in_flight_probes(), 0);
        assert_eq!(breaker.metrics().rejected_requests, 1);
    }

    #[test]
    fn test_probe_failure_reopens_despite_in_flight_probes() {
        let (breaker, clock) = breaker_with(spec_policy().with_half_open_min_samples(1));
        trip(&breaker);
        clock.advance(Duration::from_millis(1000));

        let result = breaker.call(|| {
            clock.advance(Duration::from_millis(10));
            let failed = breaker.call(fail);
            assert!(failed.unwrap_err().is_operation());
            assert_eq!(breaker.state(), CircuitState::Open);
            ok()
        });

        // Probe A succeeded, but the circuit had already reopened.
        assert!(result.is_ok());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.in_flight_probes(), 0);
        assert_eq!(breaker.metrics().ignored_outcomes, 1);

        // The open period restarted when probe B failed.
        clock.advance(Duration::from_millis(995));
        assert!(breaker.call(ok).unwrap_err().is_circuit_open());
        clock.advance(Duration::from_millis(5));
        assert!(breaker.call(ok).is_ok());
    }

    #[test]
    fn test_successful_probes_close_circuit() {
        let (breaker, clock) = breaker_with(spec_policy().with_half_open_min_samples(3));
        trip(&breaker);
        clock.advance(Duration::from_millis(1000));

        for _ in 0..2 {
            assert!(breaker.call(ok).is_ok());
            assert_eq!(breaker.state(), CircuitState::HalfOpen);
        }
        assert!(breaker.call(ok).is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().times_closed, 1);
        assert_eq!(breaker.stats().sample_count, 0);
    }

    #[test]
    fn test_round_trip_restores_closed_behavior() {
        let (breaker, clock) = breaker_with(spec_policy());
        trip(&breaker);
        clock.advance(Duration::from_millis(1000));
        for _ in 0..5 {
            assert!(breaker.call(ok).is_ok());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);

        // Same gating as a fresh breaker: four failures are not enough.
        for _ in 0..4 {
            assert!(breaker.call(fail).unwrap_err().is_operation());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.call(fail).unwrap_err().is_operation());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_fallback_on_rejection_is_not_an_outcome() {
        let (breaker, _clock) = breaker_with(spec_policy());
        trip(&breaker);

        let value = breaker.call_with_fallback(ok, cached).unwrap();
        assert_eq!(value, "cached");
        assert_eq!(breaker.stats().sample_count, 0);

        let metrics = breaker.metrics();
        assert_eq!(metrics.fallback_invocations, 1);
        assert_eq!(metrics.rejected_requests, 1);
        assert_eq!(metrics.completed_requests(), 5);
    }

    #[test]
    fn test_fallback_on_failure_records_failure() {
        let (breaker, _clock) = breaker_with(spec_policy());
        let value = breaker.call_with_fallback(fail, cached).unwrap();
        assert_eq!(value, "cached");
        assert_eq!(breaker.stats().failures, 1);
        assert_eq!(breaker.metrics().fallback_invocations, 1);

        // A failing fallback surfaces its own error.
        let err = breaker
            .call_with_fallback(fail, fallback_down)
            .unwrap_err();
        assert_eq!(err.into_operation(), Some("fallback down".to_string()));
    }

    #[test]
    fn test_failure_propagates_verbatim() {
        let (breaker, _clock) = breaker_with(spec_policy());
        let err = breaker.call(fail).unwrap_err();
        assert_eq!(err.into_operation(), Some("boom".to_string()));
    }

    #[test]
    fn test_exact_slow_threshold_counts_as_slow() {
        let (breaker, clock) = breaker_with(spec_policy());
        breaker
            .call(|| {
                clock.advance(Duration::from_millis(100));
                ok()
            })
            .unwrap();
        assert_eq!(breaker.stats().slow_calls, 1);
    }

    #[test]
    fn test_backwards_clock_is_zero_elapsed() {
        let (breaker, clock) = breaker_with(spec_policy().with_slow_call_duration(Duration::ZERO));
        breaker
            .call(|| {
                clock.rewind(Duration::from_secs(1));
                ok()
            })
            .unwrap();
        // Zero elapsed still meets a zero threshold, so the call is slow.
        assert_eq!(breaker.stats().slow_calls, 1);

        let (breaker, clock) = breaker_with(spec_policy());
        breaker
            .call(|| {
                clock.rewind(Duration::from_secs(1));
                ok()
            })
            .unwrap();
        assert_eq!(breaker.stats().slow_calls, 0);
        assert_eq!(breaker.metrics().successful_requests, 1);
    }

    #[test]
    fn test_panicking_probe_records_failure_and_releases_lease() {
        let (breaker, clock) = breaker_with(spec_policy());
        trip(&breaker);
        clock.advance(Duration::from_millis(1000));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            breaker.call(|| -> TestResult { panic!("dependency client panicked") })
        }));

        assert!(result.is_err());
        assert_eq!(breaker.in_flight_probes(), 0);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.metrics().failed_requests, 4);
    }

    #[test]
    fn test_outcome_from_previous_state_is_ignored() {
        let (breaker, _clock) = breaker_with(spec_policy());
        let result = breaker.call(|| {
            breaker.force_open();
            fail()
        });
        assert!(result.unwrap_err().is_operation());
        assert_eq!(breaker.metrics().ignored_outcomes, 1);

        breaker.force_close();
        assert_eq!(breaker.stats().sample_count, 0);
    }

    #[test]
    fn test_force_open_close_and_reset() {
        let (breaker, clock) = breaker_with(spec_policy());
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.force_open();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.call(ok).unwrap_err().is_circuit_open());

        breaker.force_close();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.call(ok).is_ok());

        breaker.force_open();
        clock.advance(Duration::from_millis(1000));
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics(), BreakerMetrics::new());
    }

    #[test]
    fn test_events_follow_lifecycle() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let clock = ManualClock::new();
        let sink_events = Arc::clone(&events);
        let breaker = CircuitBreaker::builder()
            .name("inventory")
            .policy(spec_policy().with_half_open_min_samples(1))
            .clock(clock.clone())
            .event_sink(move |event: BreakerEvent| sink_events.lock().unwrap().push(event))
            .build()
            .unwrap();

        trip(&breaker);
        let _ = breaker.call(ok);
        clock.advance(Duration::from_millis(1000));
        let _ = breaker.call(ok);

        let events = events.lock().unwrap();
        assert!(events.iter().all(|e| e.breaker == "inventory"));

        let transitions: Vec<(CircuitState, CircuitState)> = events
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::StateTransition { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::HalfOpen),
                (CircuitState::HalfOpen, CircuitState::Closed),
            ]
        );

        let recorded = events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::CallRecorded { .. }))
            .count();
        assert_eq!(recorded, 6);
        assert!(events.iter().any(|e| matches!(
            e.kind,
            EventKind::CallRejected {
                state: CircuitState::Open,
                retry_after_ms: Some(1000)
            }
        )));
        assert!(events.iter().any(|e| matches!(
            e.kind,
            EventKind::CallRecorded {
                outcome: Outcome::Failure,
                ..
            }
        )));
    }

    #[test]
    fn test_concurrent_probes_never_exceed_limit() {
        const THREADS: usize = 16;
        let policy = BreakerPolicy::new()
            .with_window_size(100)
            .with_min_samples(5)
            .with_half_open_min_samples(100)
            .with_open_duration(Duration::from_millis(1000))
            .with_half_open_max_probes(2);
        let (breaker, clock) = breaker_with(policy);
        breaker.force_open();
        clock.advance(Duration::from_millis(1000));

        let running = AtomicU32::new(0);
        let peak = AtomicU32::new(0);
        let barrier = std::sync::Barrier::new(THREADS);

        std::thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    barrier.wait();
                    for _ in 0..3 {
                        let _ = breaker.call(|| {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(2));
                            running.fetch_sub(1, Ordering::SeqCst);
                            ok()
                        });
                    }
                });
            }
        });

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
        assert_eq!(breaker.in_flight_probes(), 0);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_async_call_and_fallback() {
        let (breaker, _clock) = breaker_with(spec_policy());

        let value = breaker.call_async(|| async { ok() }).await.unwrap();
        assert_eq!(value, "ok");

        let value = breaker
            .call_async_with_fallback(|| async { fail() }, || async { cached() })
            .await
            .unwrap();
        assert_eq!(value, "cached");

        let stats = breaker.stats();
        assert_eq!(stats.sample_count, 2);
        assert_eq!(stats.failures, 1);
    }

    #[tokio::test]
    async fn test_async_rejection() {
        let (breaker, _clock) = breaker_with(spec_policy());
        breaker.force_open();

        let err = breaker.call_async(|| async { ok() }).await.unwrap_err();
        assert!(err.is_circuit_open());

        let value = breaker
            .call_async_with_fallback(|| async { ok() }, || async { cached() })
            .await
            .unwrap();
        assert_eq!(value, "cached");
    }

    #[test]
    fn test_cancelled_async_call_records_failure() {
        let (breaker, clock) = breaker_with(spec_policy());
        trip(&breaker);
        clock.advance(Duration::from_millis(1000));

        // Polling once and dropping the future cancels the probe mid-flight.
        let cancelled = breaker
            .call_async(|| std::future::pending::<TestResult>())
            .now_or_never();
        assert!(cancelled.is_none());

        assert_eq!(breaker.in_flight_probes(), 0);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.metrics().failed_requests, 4);
    }

    #[tokio::test]
    async fn test_breaker_shared_across_tasks() {
        let breaker = Arc::new(CircuitBreaker::new(spec_policy()).unwrap());

        let mut handles = Vec::new();
        for i in 0..8 {
            let breaker = Arc::clone(&breaker);
            handles.push(tokio::spawn(async move {
                breaker
                    .call_async(move || async move {
                        tokio::task::yield_now().await;
                        if i % 4 == 0 {
                            fail()
                        } else {
                            ok()
                        }
                    })
                    .await
            }));
        }
        for handle in handles {
            let _ = handle.await.unwrap();
        }

        let metrics = breaker.metrics();
        assert_eq!(metrics.total_requests, 8);
        assert_eq!(metrics.failed_requests, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
