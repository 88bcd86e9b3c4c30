//! BDD scenarios for the lifecycle closer.

use rstest_bdd_macros::scenario;

use super::test_helpers::{LifecycleContext, lifecycle_context};

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Close resources in reverse registration order"
)]
fn scenario_reverse_order(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Keep closing after a resource fails"
)]
fn scenario_failure_aggregated(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Reject registration after shutdown"
)]
fn scenario_late_registration(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}
