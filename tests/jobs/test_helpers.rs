//! Shared fixtures and helpers for job BDD scenarios.

use std::time::Duration;

use cloudjobs::job::{
    AsyncOperation, CloudStackStatusMapper, JobCompletion, JobError, JobRecord,
};
use cloudjobs::retry::RetryPolicy;
use cloudjobs::test_support::{ScriptedJobSource, ScriptedSourceError};
use rstest::fixture;

/// What awaiting a job produced, reduced to comparable values.
#[derive(Clone, Debug)]
pub enum AwaitOutcome {
    Result(Option<String>),
    Timeout { attempts: u32 },
    Failed { code: Option<i64>, message: String },
    Inconsistent(String),
    Source(String),
}

impl From<Result<Option<String>, JobError<ScriptedSourceError>>> for AwaitOutcome {
    fn from(result: Result<Option<String>, JobError<ScriptedSourceError>>) -> Self {
        match result {
            Ok(value) => Self::Result(value),
            Err(JobError::Timeout { attempts, .. }) => Self::Timeout { attempts },
            Err(JobError::Failed { detail, .. }) => Self::Failed {
                code: detail.code,
                message: detail.message,
            },
            Err(JobError::Inconsistent { reason, .. }) => Self::Inconsistent(reason),
            Err(JobError::Source(err)) => Self::Source(err.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct JobsContext {
    pub jobs: ScriptedJobSource<String>,
    pub outcome: Option<AwaitOutcome>,
}

#[fixture]
pub fn jobs_context() -> JobsContext {
    JobsContext {
        jobs: ScriptedJobSource::new(),
        outcome: None,
    }
}

pub fn poll_policy() -> RetryPolicy {
    RetryPolicy::builder()
        .poll_interval(Duration::from_secs(1))
        .max_attempts(3)
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|err| panic!("poll policy should be valid: {err}"))
}

/// Awaits `job_id` on a paused clock so poll sleeps complete instantly.
pub fn await_job(jobs: &ScriptedJobSource<String>, job_id: &str) -> AwaitOutcome {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap_or_else(|err| panic!("build test runtime: {err}"));
    let completion =
        JobCompletion::new(jobs.clone(), CloudStackStatusMapper).retrying(poll_policy());
    let operation = AsyncOperation::<String>::new(job_id);
    runtime
        .block_on(operation.await_result(&completion))
        .into()
}

pub fn pending(job_id: &str) -> JobRecord<String> {
    JobRecord::new(job_id).with_status_code(0)
}
