//! Completion predicate over a provider's job-status endpoint.

use tracing::{debug, info};

use super::{JobError, JobId, JobSnapshot, JobSource, JobState, StatusMapper};
use crate::retry::{Predicate, PredicateFuture, RetryPolicy, RetryingPredicate};

/// Tests whether a job has reached a terminal state.
///
/// Every evaluation re-fetches the job, so one instance can track any number
/// of jobs concurrently without shared mutable state.
#[derive(Clone, Debug)]
pub struct JobCompletion<S, M> {
    source: S,
    mapper: M,
}

impl<S, M> JobCompletion<S, M> {
    /// Creates a predicate reading jobs from `source` and interpreting them
    /// with `mapper`.
    #[must_use]
    pub const fn new(source: S, mapper: M) -> Self {
        Self { source, mapper }
    }

    /// Returns the job source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Returns the status mapper.
    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Wraps the predicate so each evaluation polls within `policy`.
    #[must_use]
    pub const fn retrying(self, policy: RetryPolicy) -> RetryingPredicate<Self> {
        RetryingPredicate::new(self, policy)
    }
}

impl<S, M> JobCompletion<S, M>
where
    S: JobSource,
    M: StatusMapper,
{
    /// Fetches job `id` once and maps it.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Source`] when the fetch fails and
    /// [`JobError::Inconsistent`] when the record is contradictory or belongs
    /// to a different job.
    pub async fn snapshot(
        &self,
        id: &JobId,
    ) -> Result<JobSnapshot<S::Payload>, JobError<S::Error>> {
        let record = self
            .source
            .fetch_job(id)
            .await
            .map_err(JobError::Source)?;
        if record.id != *id {
            return Err(JobError::Inconsistent {
                job_id: id.clone(),
                reason: format!("provider answered for job {}", record.id),
            });
        }
        let state = self.mapper.map(record)?;
        match &state {
            JobState::Succeeded(_) => info!(job_id = %id, "job succeeded"),
            JobState::Failed(detail) => info!(job_id = %id, error = %detail, "job failed"),
            other => debug!(job_id = %id, status = %other.status(), "job not finished"),
        }
        Ok(JobSnapshot {
            id: id.clone(),
            state,
        })
    }

    /// Polls job `id` once and reports whether it reached a terminal state.
    ///
    /// Success and failure both end polling; inspect the job with
    /// [`JobCompletion::snapshot`] to learn which one occurred.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`JobCompletion::snapshot`].
    pub async fn complete(&self, id: &JobId) -> Result<bool, JobError<S::Error>> {
        Ok(self.snapshot(id).await?.is_terminal())
    }
}

impl<S, M> Predicate<JobId> for JobCompletion<S, M>
where
    S: JobSource,
    M: StatusMapper,
{
    type Error = JobError<S::Error>;

    fn apply<'a>(&'a self, target: &'a JobId) -> PredicateFuture<'a, Self::Error> {
        Box::pin(self.complete(target))
    }
}
