//! Whole-operation retry driven by the error classifier.
//!
//! Each attempt runs the supplied operation from scratch. Failures the
//! classifier marks transient are retried within the policy bounds; anything
//! else stops the loop on the attempt that produced it.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use super::RetryPolicy;
use crate::classify::{ErrorClass, RetryableErrorClassifier};

/// Errors produced by [`retry_operation`].
#[derive(Debug, Error)]
pub enum OperationError<E>
where
    E: std::error::Error + 'static,
{
    /// Every attempt failed with a transient error and the policy ran out.
    #[error("gave up after {attempts} attempts in {elapsed:?}: {source}")]
    Exhausted {
        /// Attempts performed.
        attempts: u32,
        /// Time spent retrying.
        elapsed: Duration,
        /// Error from the final attempt.
        #[source]
        source: E,
    },
    /// An attempt failed with an error that must not be retried.
    #[error("{class} failure on attempt {attempts}: {source}")]
    NonRetryable {
        /// Attempts performed, including the failing one.
        attempts: u32,
        /// Classification that stopped the loop.
        class: ErrorClass,
        /// Error that stopped the loop.
        #[source]
        source: E,
    },
}

impl<E> OperationError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns the error from the last attempt.
    #[must_use]
    pub const fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { source, .. } | Self::NonRetryable { source, .. } => source,
        }
    }

    /// Returns the number of attempts performed.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::NonRetryable { attempts, .. } => *attempts,
        }
    }

    /// Consumes the error and returns the last underlying failure.
    #[must_use]
    pub fn into_last_error(self) -> E {
        match self {
            Self::Exhausted { source, .. } | Self::NonRetryable { source, .. } => source,
        }
    }
}

/// Runs `operation` until it succeeds, fails permanently, or `policy` is
/// exhausted.
///
/// # Errors
///
/// Returns [`OperationError::NonRetryable`] as soon as an attempt fails with
/// a non-transient error, and [`OperationError::Exhausted`] when transient
/// failures outlast the attempt cap or timeout.
pub async fn retry_operation<T, E, F, Fut>(
    policy: &RetryPolicy,
    classifier: &RetryableErrorClassifier,
    mut operation: F,
) -> Result<T, OperationError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout();
    let mut attempts: u32 = 0;

    loop {
        attempts = attempts.saturating_add(1);
        debug!(attempts, "starting attempt");
        let err = match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    info!(attempts, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let class = classifier.classify(&err);
        if class != ErrorClass::Transient {
            warn!(attempts, %class, error = %err, "operation failed permanently");
            return Err(OperationError::NonRetryable {
                attempts,
                class,
                source: err,
            });
        }

        let delay = policy.delay_after(attempts);
        if !policy.allows_attempt_after(attempts) || Instant::now() + delay > deadline {
            let elapsed = started.elapsed();
            error!(attempts, ?elapsed, error = %err, "retry budget exhausted");
            return Err(OperationError::Exhausted {
                attempts,
                elapsed,
                source: err,
            });
        }

        warn!(attempts, ?delay, error = %err, "transient failure, retrying");
        sleep(delay).await;
    }
}
