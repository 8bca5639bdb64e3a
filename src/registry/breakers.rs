//! The breaker registry.

use crate::circuit_breaker::{BreakerPolicy, CircuitBreaker};
use crate::core::{ArcClock, Clock, ConfigResult, MonotonicClock};
use crate::events::{ArcEventSink, EventSink, NoopSink, SinkDebug};
use crate::registry::health::{BreakerHealth, HealthReport};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Builder for creating a `BreakerRegistry`.
pub struct BreakerRegistryBuilder {
    policy: BreakerPolicy,
    clock: ArcClock,
    sink: ArcEventSink,
}

impl BreakerRegistryBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            policy: BreakerPolicy::default(),
            clock: Arc::new(MonotonicClock),
            sink: Arc::new(NoopSink),
        }
    }

    /// Sets the policy for breakers created by name alone.
    pub fn default_policy(mut self, policy: BreakerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the time source shared by every breaker.
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Sets the event sink shared by every breaker.
    pub fn event_sink<S: EventSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Sets a shared event sink.
    pub fn shared_event_sink(mut self, sink: ArcEventSink) -> Self {
        self.sink = sink;
        self
    }

    /// Builds the registry.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the default policy is invalid.
    pub fn build(self) -> ConfigResult<BreakerRegistry> {
        self.policy.validate()?;

        Ok(BreakerRegistry {
            default_policy: self.policy,
            clock: self.clock,
            sink: self.sink,
            breakers: RwLock::new(HashMap::new()),
        })
    }
}

impl Default for BreakerRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Named circuit breakers sharing a clock, an event sink and a default policy.
///
/// Breakers are handed out as `Arc<CircuitBreaker>`, so a caller can keep
/// one for the lifetime of a client without going back to the registry on
/// every call.
///
/// ```rust
/// use breakwater::registry::BreakerRegistry;
///
/// let registry = BreakerRegistry::new();
/// let db = registry.get_or_create("db");
/// assert!(std::sync::Arc::ptr_eq(&db, &registry.get_or_create("db")));
///
/// let report = registry.health_report();
/// assert!(report.is_healthy());
/// ```
pub struct BreakerRegistry {
    default_policy: BreakerPolicy,
    clock: ArcClock,
    sink: ArcEventSink,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Creates an empty registry with the default policy.
    pub fn new() -> Self {
        Self {
            default_policy: BreakerPolicy::default(),
            clock: Arc::new(MonotonicClock),
            sink: Arc::new(NoopSink),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a new builder.
    pub fn builder() -> BreakerRegistryBuilder {
        BreakerRegistryBuilder::new()
    }

    /// Returns the policy used by [`get_or_create`](Self::get_or_create).
    pub fn default_policy(&self) -> &BreakerPolicy {
        &self.default_policy
    }

    /// Returns the breaker named `name`, creating it with the default policy if needed.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.read().get(name) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.write();
        let breaker = breakers.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(breaker = %name, "Registering circuit breaker with default policy");
            Arc::new(self.create(name, self.default_policy.clone()))
        });
        Arc::clone(breaker)
    }

    /// Registers a breaker with its own policy, replacing any breaker of the same name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `policy` is invalid; the registry is left unchanged.
    pub fn register(&self, name: &str, policy: BreakerPolicy) -> ConfigResult<Arc<CircuitBreaker>> {
        policy.validate()?;

        let breaker = Arc::new(self.create(name, policy));
        let previous = self
            .write()
            .insert(name.to_string(), Arc::clone(&breaker));

        if previous.is_some() {
            tracing::info!(breaker = %name, "Replaced circuit breaker");
        } else {
            tracing::debug!(breaker = %name, "Registered circuit breaker");
        }

        Ok(breaker)
    }

    /// Returns the breaker named `name`, if registered.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.read().get(name).cloned()
    }

    /// Removes and returns the breaker named `name`.
    ///
    /// Holders of the returned `Arc` keep a working breaker; it is just no
    /// longer reachable through the registry.
    pub fn remove(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.write().remove(name)
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered breakers.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if no breakers are registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Takes a health snapshot of every registered breaker.
    pub fn health_report(&self) -> HealthReport {
        let breakers: Vec<Arc<CircuitBreaker>> = self.read().values().cloned().collect();
        HealthReport::new(
            breakers
                .iter()
                .map(|b| BreakerHealth::capture(b))
                .collect(),
        )
    }

    fn create(&self, name: &str, policy: BreakerPolicy) -> CircuitBreaker {
        CircuitBreaker::from_parts(
            name.to_string(),
            policy,
            Arc::clone(&self.clock),
            Arc::clone(&self.sink),
        )
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        self.breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        self.breakers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("breakers", &self.names())
            .field("default_policy", &self.default_policy)
            .field("sink", &SinkDebug(self.sink.as_ref()))
            .finish()
    }
}
