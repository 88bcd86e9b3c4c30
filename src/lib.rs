//! Core library for the cloudjobs client.
//!
//! Cloud providers answer long-running requests with a job identifier. The
//! crate polls such jobs to a terminal state under bounded retry policies,
//! classifies transport failures as transient or permanent, and tears down
//! client resources in a predictable order at shutdown.

pub mod classify;
pub mod config;
pub mod job;
pub mod lifecycle;
pub mod retry;
pub mod test_support;

pub use classify::{
    CausalChain, ErrorClass, ErrorDescriptor, ErrorTag, RetryableErrorClassifier,
    RetryableMessageSet, TransportError, causal_chain_has_message_containing,
};
pub use config::{ClientConfig, ConfigError};
pub use job::{
    AsyncOperation, CloudStackStatusMapper, ErrorDetail, GoGridStatusMapper, HttpJobSource,
    HttpSourceError, InconsistentJob, JobCompletion, JobError, JobId, JobRecord, JobSnapshot,
    JobSource, JobState, JobStatus, MapperKind, ProgressStatusMapper, StatusMapper, check_job,
};
pub use lifecycle::{
    AggregateCloseError, CloseFailure, CloseReason, Closeable, Closer, CloserState,
    LifecycleError, WorkerPool,
};
pub use retry::{
    Backoff, OperationError, PolicyError, PollOutcome, Predicate, RetryPolicy, RetryingPredicate,
    retry_operation,
};
