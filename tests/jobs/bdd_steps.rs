//! BDD step definitions for awaiting jobs through a scripted provider.

use cloudjobs::job::{CLOUDSTACK_RESULT_FAIL, ErrorDetail, JobRecord};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{AwaitOutcome, JobsContext, await_job, pending};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn outcome(jobs_context: &JobsContext) -> Result<&AwaitOutcome, StepError> {
    jobs_context
        .outcome
        .as_ref()
        .ok_or_else(|| StepError::Assertion(String::from("missing await outcome")))
}

#[given("a CloudStack job \"{job_id}\" pending for {polls:u32} polls before succeeding with \"{result}\"")]
fn job_succeeding_after_polls(
    jobs_context: JobsContext,
    job_id: String,
    polls: u32,
    result: String,
) -> JobsContext {
    let id = job_id.trim();
    for _ in 0..polls {
        jobs_context.jobs.push(id, pending(id));
    }
    jobs_context.jobs.push(
        id,
        JobRecord::new(id)
            .with_status_code(1)
            .with_result_code(0)
            .with_result(result),
    );
    jobs_context
}

#[given("a CloudStack job \"{job_id}\" failing with code {code:i64} and message \"{message}\"")]
fn job_failing_with_detail(
    jobs_context: JobsContext,
    job_id: String,
    code: i64,
    message: String,
) -> JobsContext {
    let id = job_id.trim();
    jobs_context.jobs.push(id, pending(id));
    jobs_context.jobs.push(
        id,
        JobRecord::new(id)
            .with_status_code(2)
            .with_result_code(CLOUDSTACK_RESULT_FAIL)
            .with_error(ErrorDetail::new(Some(code), message)),
    );
    jobs_context
}

#[given("a CloudStack job \"{job_id}\" failing without error detail")]
fn job_failing_without_detail(jobs_context: JobsContext, job_id: String) -> JobsContext {
    let id = job_id.trim();
    jobs_context
        .jobs
        .push(id, JobRecord::new(id).with_status_code(2));
    jobs_context
}

#[given("a CloudStack job \"{job_id}\" that stays pending")]
fn job_staying_pending(jobs_context: JobsContext, job_id: String) -> JobsContext {
    let id = job_id.trim();
    jobs_context.jobs.push(id, pending(id));
    jobs_context
}

#[when("I await the result of job \"{job_id}\"")]
fn await_result(mut jobs_context: JobsContext, job_id: String) -> JobsContext {
    jobs_context.outcome = Some(await_job(&jobs_context.jobs, job_id.trim()));
    jobs_context
}

#[then("the await returns \"{expected}\"")]
fn await_returns(jobs_context: &JobsContext, expected: String) -> Result<(), StepError> {
    match outcome(jobs_context)? {
        AwaitOutcome::Result(Some(value)) if *value == expected => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected result {expected}, got {other:?}"
        ))),
    }
}

#[then("job \"{job_id}\" was fetched {count:u32} times")]
fn job_fetch_count(jobs_context: &JobsContext, job_id: String, count: u32) -> Result<(), StepError> {
    let fetched = jobs_context.jobs.fetch_count(job_id.trim());
    if fetched == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} fetches, got {fetched}"
        )))
    }
}

#[then("the await fails with code {code:i64} and message \"{message}\"")]
fn await_fails_with(
    jobs_context: &JobsContext,
    code: i64,
    message: String,
) -> Result<(), StepError> {
    match outcome(jobs_context)? {
        AwaitOutcome::Failed {
            code: Some(actual),
            message: actual_message,
        } if *actual == code && *actual_message == message => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected failure {code} {message}, got {other:?}"
        ))),
    }
}

#[then("the await reports an inconsistent job")]
fn await_inconsistent(jobs_context: &JobsContext) -> Result<(), StepError> {
    match outcome(jobs_context)? {
        AwaitOutcome::Inconsistent(reason) if reason.contains("without error detail") => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected inconsistent job, got {other:?}"
        ))),
    }
}

#[then("the await times out after {attempts:u32} attempts")]
fn await_times_out(jobs_context: &JobsContext, attempts: u32) -> Result<(), StepError> {
    match outcome(jobs_context)? {
        AwaitOutcome::Timeout { attempts: actual } if *actual == attempts => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected timeout after {attempts} attempts, got {other:?}"
        ))),
    }
}
