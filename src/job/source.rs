//! Provider job-status endpoint abstraction.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::{JobId, JobRecord};

/// Future returned by [`JobSource`] operations.
pub type SourceFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Read access to a provider's asynchronous jobs.
///
/// Each call performs one request. Retrying failed requests is the
/// implementation's concern; polling until a job finishes is the caller's.
pub trait JobSource: Send + Sync {
    /// Typed result payload carried by succeeded jobs.
    type Payload: Send;
    /// Error raised when a request fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches the current record of job `id`.
    fn fetch_job<'a>(
        &'a self,
        id: &'a JobId,
    ) -> SourceFuture<'a, JobRecord<Self::Payload>, Self::Error>;

    /// Lists the jobs visible to the caller.
    fn list_jobs(&self) -> SourceFuture<'_, Vec<JobRecord<Self::Payload>>, Self::Error>;
}

impl<S> JobSource for Arc<S>
where
    S: JobSource + ?Sized,
{
    type Payload = S::Payload;
    type Error = S::Error;

    fn fetch_job<'a>(
        &'a self,
        id: &'a JobId,
    ) -> SourceFuture<'a, JobRecord<Self::Payload>, Self::Error> {
        (**self).fetch_job(id)
    }

    fn list_jobs(&self) -> SourceFuture<'_, Vec<JobRecord<Self::Payload>>, Self::Error> {
        (**self).list_jobs()
    }
}
