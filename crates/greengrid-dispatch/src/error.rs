//! Dispatch error types.

use thiserror::Error;

/// Errors that can occur while dispatching or accounting for jobs.
///
/// Intensity lookups never fail; everything here comes from the store or
/// from the runtime's work queue.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("state store error: {0}")]
    State(#[from] greengrid_state::StateError),

    #[error("scheduler work queue is closed")]
    QueueClosed,
}

pub type DispatchResult<T> = Result<T, DispatchError>;
