//! Bounded polling and retry.
//!
//! [`RetryPolicy`] describes the bounds, [`RetryingPredicate`] polls a
//! boolean condition within them, and [`retry_operation`] repeats a fallible
//! operation while its failures classify as transient.

mod operation;
mod policy;
mod predicate;

pub use operation::{OperationError, retry_operation};
pub use policy::{
    Backoff, DEFAULT_MAX_INTERVAL, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT, PolicyError,
    RetryPolicy, RetryPolicyBuilder,
};
pub use predicate::{
    FnPredicate, PollOutcome, Predicate, PredicateFuture, RetryingPredicate, from_fn, retry,
};
