//! Polling primitive that re-evaluates a predicate until it holds or the
//! policy bounds are exhausted.
//!
//! Exhaustion is reported as `Ok(false)` (or an unsatisfied
//! [`PollOutcome`]), never as an error. Errors raised by the wrapped
//! predicate propagate to the caller on the attempt that raised them and are
//! not retried here; whole-request retries belong to
//! [`crate::retry::retry_operation`].

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tracing::{debug, error};

use super::RetryPolicy;

/// Future returned by [`Predicate::apply`].
pub type PredicateFuture<'a, E> = Pin<Box<dyn Future<Output = Result<bool, E>> + Send + 'a>>;

/// Asynchronous boolean test over a borrowed target.
pub trait Predicate<T: ?Sized>: Send + Sync {
    /// Error raised when the predicate cannot be evaluated.
    type Error: Send + 'static;

    /// Evaluates the predicate once against `target`.
    fn apply<'a>(&'a self, target: &'a T) -> PredicateFuture<'a, Self::Error>;
}

/// Adapter turning a synchronous closure into a [`Predicate`].
pub struct FnPredicate<F, T: ?Sized> {
    test: F,
    _target: PhantomData<fn(&T)>,
}

/// Wraps `test` so it can be polled by a [`RetryingPredicate`].
#[must_use]
pub const fn from_fn<F, T, E>(test: F) -> FnPredicate<F, T>
where
    F: Fn(&T) -> Result<bool, E> + Send + Sync,
    T: ?Sized,
{
    FnPredicate {
        test,
        _target: PhantomData,
    }
}

impl<F, T, E> Predicate<T> for FnPredicate<F, T>
where
    F: Fn(&T) -> Result<bool, E> + Send + Sync,
    T: ?Sized,
    E: Send + 'static,
{
    type Error = E;

    fn apply<'a>(&'a self, target: &'a T) -> PredicateFuture<'a, E> {
        let result = (self.test)(target);
        Box::pin(async move { result })
    }
}

/// Result of one bounded poll loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollOutcome {
    /// Whether the predicate held before the bounds were exhausted.
    pub satisfied: bool,
    /// Number of evaluations performed.
    pub attempts: u32,
    /// Time spent in the loop.
    pub elapsed: Duration,
}

/// A predicate wrapped with a [`RetryPolicy`].
///
/// The wrapper holds no mutable state, so one instance may be evaluated by
/// many tasks at once against independent targets.
#[derive(Clone, Debug)]
pub struct RetryingPredicate<P> {
    inner: P,
    policy: RetryPolicy,
}

/// Wraps `inner` so each evaluation polls until it holds or `policy` is
/// exhausted.
#[must_use]
pub const fn retry<P>(inner: P, policy: RetryPolicy) -> RetryingPredicate<P> {
    RetryingPredicate::new(inner, policy)
}

impl<P> RetryingPredicate<P> {
    /// Creates a retrying wrapper.
    #[must_use]
    pub const fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Returns the wrapped predicate.
    #[must_use]
    pub const fn inner(&self) -> &P {
        &self.inner
    }

    /// Returns the policy bounding each evaluation.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Polls the wrapped predicate against `target`.
    ///
    /// The first evaluation happens immediately. Every unsatisfied
    /// evaluation is followed by the policy delay, including the last one
    /// allowed by the attempt cap, so three attempts at a one second interval
    /// take three seconds. No sleep extends past the timeout and no
    /// evaluation starts after it.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by the wrapped predicate.
    pub async fn evaluate<T>(&self, target: &T) -> Result<PollOutcome, P::Error>
    where
        P: Predicate<T>,
        T: ?Sized + Sync,
    {
        let started = Instant::now();
        let deadline = started + self.policy.timeout();
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            if self.inner.apply(target).await? {
                debug!(attempts, "predicate satisfied");
                return Ok(PollOutcome {
                    satisfied: true,
                    attempts,
                    elapsed: started.elapsed(),
                });
            }

            let delay = self.policy.delay_after(attempts);
            let wake = Instant::now() + delay;
            if wake > deadline {
                sleep_until(deadline).await;
                break;
            }
            debug!(attempts, ?delay, "predicate not yet satisfied");
            sleep_until(wake).await;
            if !self.policy.allows_attempt_after(attempts) {
                break;
            }
        }

        let elapsed = started.elapsed();
        error!(attempts, ?elapsed, "polling bounds exhausted");
        Ok(PollOutcome {
            satisfied: false,
            attempts,
            elapsed,
        })
    }
}

impl<P, T> Predicate<T> for RetryingPredicate<P>
where
    P: Predicate<T>,
    T: ?Sized + Sync,
{
    type Error = P::Error;

    fn apply<'a>(&'a self, target: &'a T) -> PredicateFuture<'a, Self::Error> {
        Box::pin(async move {
            self.evaluate(target)
                .await
                .map(|outcome| outcome.satisfied)
        })
    }
}
