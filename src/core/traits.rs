//! Core traits for the breakwater library.
//!
//! A guarded call is modeled as a single capability: something that can be
//! invoked once and yields either a value or an error. Fallbacks share the
//! same shape, so a breaker is polymorphic over exactly one kind of value.
//!
//! Both traits are implemented for plain closures, which is what most
//! callers will pass:
//!
//! ```rust
//! use breakwater::core::Operation;
//!
//! let op = || -> Result<u32, std::io::Error> { Ok(7) };
//! assert_eq!(Operation::invoke(op).unwrap(), 7);
//! ```

use async_trait::async_trait;
use std::future::Future;

/// A synchronous, invoke-once guarded operation.
pub trait Operation {
    /// The value produced on success.
    type Output;
    /// The error produced on failure.
    type Error;

    /// Runs the operation.
    fn invoke(self) -> Result<Self::Output, Self::Error>;
}

impl<F, T, E> Operation for F
where
    F: FnOnce() -> Result<T, E>,
{
    type Output = T;
    type Error = E;

    fn invoke(self) -> Result<T, E> {
        self()
    }
}

/// An asynchronous, invoke-once guarded operation.
///
/// The breaker never spawns or polls on its own; the returned future is
/// driven by whatever runtime the caller uses.
///
/// # Implementation Notes
///
/// - Implementations must be `Send` so breakers can be shared across tasks.
/// - Cancellation is the caller's business: if the future is dropped before
///   it completes, the breaker records the call as a failure.
#[async_trait]
pub trait AsyncOperation: Send {
    /// The value produced on success.
    type Output: Send;
    /// The error produced on failure.
    type Error: Send;

    /// Runs the operation.
    async fn invoke(self) -> Result<Self::Output, Self::Error>;
}

#[async_trait]
impl<F, Fut, T, E> AsyncOperation for F
where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: Send,
{
    type Output = T;
    type Error = E;

    async fn invoke(self) -> Result<T, E> {
        self().await
    }
}
