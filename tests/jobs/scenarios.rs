//! BDD scenarios for awaiting jobs.

use rstest_bdd_macros::scenario;

use super::test_helpers::{JobsContext, jobs_context};

#[scenario(
    path = "tests/features/jobs.feature",
    name = "Return the result of a job that succeeds after pending polls"
)]
fn scenario_result_after_pending_polls(jobs_context: JobsContext) {
    let _ = jobs_context;
}

#[scenario(
    path = "tests/features/jobs.feature",
    name = "Surface the provider error of a failed job"
)]
fn scenario_failed_job(jobs_context: JobsContext) {
    let _ = jobs_context;
}

#[scenario(
    path = "tests/features/jobs.feature",
    name = "Reject a failed job without error detail"
)]
fn scenario_failed_without_detail(jobs_context: JobsContext) {
    let _ = jobs_context;
}

#[scenario(
    path = "tests/features/jobs.feature",
    name = "Give up on a job that never finishes"
)]
fn scenario_never_finishes(jobs_context: JobsContext) {
    let _ = jobs_context;
}
