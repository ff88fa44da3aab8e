use std::ops::ControlFlow;
use std::sync::Arc;

use crate::AttemptError;
use crate::LeakyBucket;
use crate::RateLimitExceeded;
use crate::Strategy;

/// Run operations only when a [`Strategy`] admits them.
///
/// Implemented for every strategy, including `dyn Strategy`.
pub trait Attempt: Strategy {
    /// Invoke `operation(args)` if the strategy admits the call.
    ///
    /// Whatever the operation returns, including its own errors, is passed back
    /// untouched inside `Ok`.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitExceeded` without running the operation if the call was
    /// rejected.
    fn attempt<A, R, F>(&self, operation: F, args: A) -> Result<R, RateLimitExceeded>
    where
        F: FnOnce(A) -> R,
    {
        match self.process() {
            ControlFlow::Continue(()) => Ok(operation(args)),
            ControlFlow::Break(reason) => Err(reason.into()),
        }
    }

    /// Like [`Attempt::attempt`], for operations that can fail.
    ///
    /// # Errors
    ///
    /// `AttemptError::RateLimited` if the call was rejected, or
    /// `AttemptError::Operation` carrying the operation's own error.
    fn try_attempt<A, T, E, F>(&self, operation: F, args: A) -> Result<T, AttemptError<E>>
    where
        F: FnOnce(A) -> Result<T, E>,
    {
        self.attempt(operation, args)?.map_err(AttemptError::Operation)
    }
}

impl<S> Attempt for S where S: Strategy + ?Sized {}

/// An operation bundled with the limiter that guards it.
///
/// The limiter is shared, so several operations may draw on one bucket.
#[derive(Debug)]
pub struct RateLimited<F, S = LeakyBucket>
where
    S: ?Sized,
{
    operation: F,
    limiter: Arc<S>,
}

impl<F, S> Clone for RateLimited<F, S>
where
    F: Clone,
    S: ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

impl<F, S> RateLimited<F, S>
where
    S: Strategy + ?Sized,
{
    pub fn new(operation: F, limiter: Arc<S>) -> Self {
        Self { operation, limiter }
    }

    /// Call the operation if the limiter admits it.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitExceeded` if the call was rejected.
    pub fn call<A, R>(&self, args: A) -> Result<R, RateLimitExceeded>
    where
        F: Fn(A) -> R,
    {
        self.limiter.attempt(&self.operation, args)
    }

    /// Call a fallible operation if the limiter admits it.
    ///
    /// # Errors
    ///
    /// See [`Attempt::try_attempt`].
    pub fn try_call<A, T, E>(&self, args: A) -> Result<T, AttemptError<E>>
    where
        F: Fn(A) -> Result<T, E>,
    {
        self.limiter.try_attempt(&self.operation, args)
    }

    pub fn limiter(&self) -> &Arc<S> {
        &self.limiter
    }
}

impl LeakyBucket {
    /// Guard `operation` with this bucket.
    pub fn wrap<F>(self, operation: F) -> RateLimited<F> {
        RateLimited::new(operation, Arc::new(self))
    }
}
