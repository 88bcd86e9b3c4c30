//! Correlates a submitted job with its eventual typed outcome.

use std::marker::PhantomData;

use serde::Deserialize;
use tracing::info;

use super::{JobCompletion, JobError, JobId, JobSource, JobState, StatusMapper};
use crate::retry::RetryingPredicate;

/// Handle returned when a provider accepts a long-running request.
///
/// Providers usually answer with the job identifier and, for create
/// operations, the identifier of the resource being created.
#[derive(Debug, Deserialize)]
pub struct AsyncOperation<T> {
    #[serde(alias = "jobid", alias = "jobId")]
    job_id: JobId,
    #[serde(rename = "id", default)]
    resource_id: Option<JobId>,
    #[serde(skip)]
    _result: PhantomData<fn() -> T>,
}

impl<T> Clone for AsyncOperation<T> {
    fn clone(&self) -> Self {
        Self {
            job_id: self.job_id.clone(),
            resource_id: self.resource_id.clone(),
            _result: PhantomData,
        }
    }
}

impl<T> AsyncOperation<T> {
    /// Creates a handle for job `job_id`.
    #[must_use]
    pub fn new(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            resource_id: None,
            _result: PhantomData,
        }
    }

    /// Records the identifier of the resource the job creates.
    #[must_use]
    pub fn with_resource_id(mut self, resource_id: impl Into<JobId>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Returns the job identifier.
    #[must_use]
    pub const fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Returns the identifier of the resource being created, in the same
    /// opaque form as job identifiers.
    #[must_use]
    pub const fn resource_id(&self) -> Option<&JobId> {
        self.resource_id.as_ref()
    }

    /// Waits until the job finishes and returns its typed result.
    ///
    /// Void operations succeed with `None`. A failed job never yields a
    /// result, even when the provider left a stale one on the record.
    ///
    /// # Errors
    ///
    /// - [`JobError::Timeout`] when polling exhausts the policy bounds;
    /// - [`JobError::Failed`] with the provider detail when the job failed;
    /// - [`JobError::Inconsistent`] when the provider reports contradictory
    ///   or non-terminal data after completion;
    /// - [`JobError::Source`] when a status request fails.
    pub async fn await_result<S, M>(
        &self,
        completion: &RetryingPredicate<JobCompletion<S, M>>,
    ) -> Result<Option<T>, JobError<S::Error>>
    where
        S: JobSource<Payload = T>,
        M: StatusMapper,
        T: Send,
    {
        let outcome = completion.evaluate(&self.job_id).await?;
        if !outcome.satisfied {
            return Err(JobError::Timeout {
                job_id: self.job_id.clone(),
                attempts: outcome.attempts,
                elapsed: outcome.elapsed,
            });
        }

        let snapshot = completion.inner().snapshot(&self.job_id).await?;
        match snapshot.state {
            JobState::Succeeded(result) => {
                info!(job_id = %self.job_id, has_result = result.is_some(), "job result ready");
                Ok(result)
            }
            JobState::Failed(detail) => Err(JobError::Failed {
                job_id: self.job_id.clone(),
                detail,
            }),
            other => Err(JobError::Inconsistent {
                job_id: self.job_id.clone(),
                reason: format!("job reported {} after completing", other.status()),
            }),
        }
    }
}
