//! BDD step definitions for closer ordering and failure aggregation.

use std::sync::Arc;

use cloudjobs::lifecycle::Closeable;
use cloudjobs::test_support::RecordingResource;
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{LifecycleContext, block_on, names};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn register(context: &LifecycleContext, list: &str, failing: Option<&str>) {
    block_on(async {
        for name in names(list) {
            let mut resource = RecordingResource::new(name, &context.log);
            if failing == Some(name) {
                resource = resource.failing(format!("{name} refused to close"));
            }
            let shared: Arc<dyn Closeable> = Arc::new(resource);
            context
                .closer
                .add_to_close(shared)
                .await
                .unwrap_or_else(|err| panic!("register {name}: {err}"));
        }
    });
}

#[given("resources \"{list}\" registered with the closer")]
fn resources_registered(lifecycle_context: LifecycleContext, list: String) -> LifecycleContext {
    register(&lifecycle_context, &list, None);
    lifecycle_context
}

#[given("resources \"{list}\" registered with \"{failing}\" failing to close")]
fn resources_registered_with_failure(
    lifecycle_context: LifecycleContext,
    list: String,
    failing: String,
) -> LifecycleContext {
    register(&lifecycle_context, &list, Some(failing.trim()));
    lifecycle_context
}

#[when("the closer is closed")]
fn closer_closed(mut lifecycle_context: LifecycleContext) -> LifecycleContext {
    let closer = Arc::clone(&lifecycle_context.closer);
    lifecycle_context.close_error = block_on(async move { closer.close().await })
        .err()
        .map(|err| err.to_string());
    lifecycle_context
}

#[when("resource \"{name}\" is registered")]
fn late_registration(mut lifecycle_context: LifecycleContext, name: String) -> LifecycleContext {
    let resource: Arc<dyn Closeable> =
        Arc::new(RecordingResource::new(name.trim(), &lifecycle_context.log));
    let closer = Arc::clone(&lifecycle_context.closer);
    lifecycle_context.registration_error =
        block_on(async move { closer.add_to_close(resource).await })
            .err()
            .map(|err| err.to_string());
    lifecycle_context
}

#[then("the resources closed in the order \"{order}\"")]
fn closed_in_order(lifecycle_context: &LifecycleContext, order: String) -> Result<(), StepError> {
    let expected: Vec<&str> = names(&order).collect();
    let actual = lifecycle_context.log.entries();
    if actual == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected close order {expected:?}, got {actual:?}"
        )))
    }
}

#[then("the closer state is \"{state}\"")]
fn closer_state(lifecycle_context: &LifecycleContext, state: String) -> Result<(), StepError> {
    let actual = lifecycle_context.closer.state().to_string();
    if actual == state.trim() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected state {state}, got {actual}"
        )))
    }
}

#[then("the close error names \"{name}\"")]
fn close_error_names(lifecycle_context: &LifecycleContext, name: String) -> Result<(), StepError> {
    match lifecycle_context.close_error.as_deref() {
        Some(message) if message.contains(&format!("{}: ", name.trim())) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected close error naming {name}, got {other:?}"
        ))),
    }
}

#[then("the registration is rejected")]
fn registration_rejected(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    match lifecycle_context.registration_error.as_deref() {
        Some(message) if message.contains("already done") => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected rejected registration, got {other:?}"
        ))),
    }
}
