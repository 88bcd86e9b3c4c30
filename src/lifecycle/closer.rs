//! Ordered, exactly-once shutdown of registered resources.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Error returned by a resource that failed to close.
pub type CloseCause = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by [`Closeable::close`].
pub type CloseFuture<'a> = Pin<Box<dyn Future<Output = Result<(), CloseCause>> + Send + 'a>>;

/// A resource torn down by a [`Closer`].
pub trait Closeable: Send + Sync {
    /// Name used in logs and close failures.
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }

    /// Releases the resource.
    fn close(&self) -> CloseFuture<'_>;
}

/// Position of a [`Closer`] in its one-way lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CloserState {
    /// Accepting registrations; `close` has not started.
    Available,
    /// `close` is tearing resources down.
    Processing,
    /// Every resource has been closed.
    Done,
}

impl CloserState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Available => 0,
            Self::Processing => 1,
            Self::Done => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Available,
            1 => Self::Processing,
            _ => Self::Done,
        }
    }
}

impl fmt::Display for CloserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Available => "AVAILABLE",
            Self::Processing => "PROCESSING",
            Self::Done => "DONE",
        })
    }
}

/// Why a single resource failed to close.
#[derive(Debug)]
pub enum CloseReason {
    /// The resource reported an error.
    Failed(CloseCause),
    /// The resource did not finish within the per-resource timeout and was
    /// abandoned.
    TimedOut(Duration),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(cause) => write!(f, "{cause}"),
            Self::TimedOut(limit) => write!(f, "did not close within {limit:?}"),
        }
    }
}

/// A resource that failed to close.
#[derive(Debug)]
pub struct CloseFailure {
    /// Resource name.
    pub resource: String,
    /// Failure reason.
    pub reason: CloseReason,
}

impl fmt::Display for CloseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.reason)
    }
}

/// Every close failure observed during one shutdown, in close order.
#[derive(Debug, Error)]
#[error("{} resource(s) failed to close: {}", .failures.len(), render_failures(.failures))]
pub struct AggregateCloseError {
    /// Individual failures.
    pub failures: Vec<CloseFailure>,
}

fn render_failures(failures: &[CloseFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by lifecycle components.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A resource was registered after shutdown completed.
    #[error("closer is already done; cannot register {resource}")]
    Closed {
        /// Rejected resource.
        resource: String,
    },
    /// Work was submitted to a pool that has shut down.
    #[error("worker pool {pool} is shut down")]
    PoolShutdown {
        /// Pool name.
        pool: String,
    },
    /// One or more resources failed to close.
    #[error(transparent)]
    Aggregate(#[from] AggregateCloseError),
}

/// Shutdown coordinator.
///
/// Resources close in reverse registration order so dependants go before
/// the resources they were built on. The state only moves forward, and the
/// registration list and transition share one lock, so concurrent `close`
/// calls wait for the first one to finish instead of closing twice.
pub struct Closer {
    state: AtomicU8,
    resources: Mutex<Vec<Arc<dyn Closeable>>>,
    close_timeout: Option<Duration>,
}

impl fmt::Debug for Closer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closer")
            .field("state", &self.state())
            .field("close_timeout", &self.close_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for Closer {
    fn default() -> Self {
        Self::new()
    }
}

impl Closer {
    /// Creates a closer that waits for every resource indefinitely.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(0),
            resources: Mutex::const_new(Vec::new()),
            close_timeout: None,
        }
    }

    /// Abandons any resource that takes longer than `limit` to close.
    #[must_use]
    pub const fn with_close_timeout(mut self, limit: Duration) -> Self {
        self.close_timeout = Some(limit);
        self
    }

    /// Returns the per-resource close timeout.
    #[must_use]
    pub const fn close_timeout(&self) -> Option<Duration> {
        self.close_timeout
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> CloserState {
        CloserState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: CloserState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Registers `resource` for shutdown.
    ///
    /// Registration during [`CloserState::Processing`] waits for the running
    /// shutdown and is then rejected.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Closed`] once the closer is done.
    pub async fn add_to_close(&self, resource: Arc<dyn Closeable>) -> Result<(), LifecycleError> {
        let mut resources = self.resources.lock().await;
        if self.state() == CloserState::Done {
            return Err(LifecycleError::Closed {
                resource: resource.name().into_owned(),
            });
        }
        debug!(resource = %resource.name(), "registered for shutdown");
        resources.push(resource);
        Ok(())
    }

    /// Closes every registered resource exactly once.
    ///
    /// The first caller drives the shutdown; concurrent callers wait until it
    /// is done and return `Ok(())`. A failing or timed out resource does not
    /// stop the remaining ones from closing.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Aggregate`] listing every resource that
    /// failed. The closer is [`CloserState::Done`] either way.
    pub async fn close(&self) -> Result<(), LifecycleError> {
        let mut resources = self.resources.lock().await;
        if self.state() == CloserState::Done {
            return Ok(());
        }
        self.set_state(CloserState::Processing);
        info!(resources = resources.len(), "closing resources");

        let mut failures = Vec::new();
        while let Some(resource) = resources.pop() {
            if let Some(failure) = self.close_one(resource.as_ref()).await {
                warn!(%failure, "resource failed to close");
                failures.push(failure);
            }
        }

        self.set_state(CloserState::Done);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AggregateCloseError { failures }.into())
        }
    }

    async fn close_one(&self, resource: &dyn Closeable) -> Option<CloseFailure> {
        let name = resource.name().into_owned();
        debug!(resource = %name, "closing");
        let reason = match self.close_timeout {
            None => resource.close().await.err().map(CloseReason::Failed),
            Some(limit) => match tokio::time::timeout(limit, resource.close()).await {
                Ok(result) => result.err().map(CloseReason::Failed),
                Err(_) => Some(CloseReason::TimedOut(limit)),
            },
        };
        reason.map(|cause| CloseFailure {
            resource: name,
            reason: cause,
        })
    }
}
