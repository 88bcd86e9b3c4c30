//! Bounded pool for running job waits concurrently.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{CloseFuture, Closeable, LifecycleError};

/// Runs at most `size` tasks at a time.
///
/// Registered with a [`super::Closer`], the pool stops accepting work and
/// waits for in-flight tasks when the closer shuts down.
#[derive(Debug)]
pub struct WorkerPool {
    name: String,
    permits: Arc<Semaphore>,
    size: u32,
    shutdown: AtomicBool,
}

impl WorkerPool {
    /// Creates a pool running at most `size` tasks concurrently.
    ///
    /// A size of zero is raised to one.
    #[must_use]
    pub fn new(name: impl Into<String>, size: u32) -> Self {
        let bounded = size.max(1);
        Self {
            name: name.into(),
            permits: Arc::new(Semaphore::new(usize::try_from(bounded).unwrap_or(1))),
            size: bounded,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Returns the pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the maximum number of concurrent tasks.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Whether the pool has stopped accepting work.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Runs `task` once a slot is free.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::PoolShutdown`] when the pool has shut down
    /// before a slot became available.
    pub async fn spawn<F>(&self, task: F) -> Result<JoinHandle<F::Output>, LifecycleError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.is_shutdown() {
            return Err(self.rejected());
        }
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| self.rejected())?;
        Ok(tokio::spawn(async move {
            let output = task.await;
            drop(permit);
            output
        }))
    }

    /// Stops accepting work and waits for in-flight tasks to finish.
    pub async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(pool = %self.name, "draining worker pool");
        if let Ok(all) = self.permits.acquire_many(self.size).await {
            all.forget();
        }
        self.permits.close();
    }

    fn rejected(&self) -> LifecycleError {
        LifecycleError::PoolShutdown {
            pool: self.name.clone(),
        }
    }
}

impl Closeable for WorkerPool {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn close(&self) -> CloseFuture<'_> {
        Box::pin(async move {
            self.shutdown().await;
            Ok(())
        })
    }
}
