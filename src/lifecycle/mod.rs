//! Process shutdown coordination.
//!
//! A [`Closer`] is constructed explicitly and handed to whatever owns
//! closeable resources; there is no ambient global instance.

mod closer;
mod pool;

pub use closer::{
    AggregateCloseError, CloseCause, CloseFailure, CloseFuture, CloseReason, Closeable, Closer,
    CloserState, LifecycleError,
};
pub use pool::WorkerPool;
