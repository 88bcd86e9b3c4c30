//! Shared fixtures and helpers for lifecycle BDD scenarios.

use std::future::Future;
use std::sync::Arc;

use cloudjobs::lifecycle::Closer;
use cloudjobs::test_support::CloseLog;
use rstest::fixture;

#[derive(Clone, Debug)]
pub struct LifecycleContext {
    pub closer: Arc<Closer>,
    pub log: CloseLog,
    pub close_error: Option<String>,
    pub registration_error: Option<String>,
}

#[fixture]
pub fn lifecycle_context() -> LifecycleContext {
    LifecycleContext {
        closer: Arc::new(Closer::new()),
        log: CloseLog::default(),
        close_error: None,
        registration_error: None,
    }
}

pub fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap_or_else(|err| panic!("build test runtime: {err}"))
        .block_on(future)
}

pub fn names(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|name| !name.is_empty())
}
