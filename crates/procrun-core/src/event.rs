//! Completion event delivered when an async run ends.

use std::time::Duration;

use crate::error::RunError;
use crate::ids::RunId;

/// Describes how an async run ended.
///
/// Built exactly once per `process_async` call and handed by reference to
/// every listener. Immutable after construction.
#[derive(Debug)]
pub struct CompletionEvent<E> {
    run_id: RunId,
    error: Option<RunError<E>>,
    cancelled: bool,
    elapsed: Duration,
}

impl<E> CompletionEvent<E> {
    /// Create a completion event.
    pub fn new(
        run_id: RunId,
        error: Option<RunError<E>>,
        cancelled: bool,
        elapsed: Duration,
    ) -> Self {
        Self {
            run_id,
            error,
            cancelled,
            elapsed,
        }
    }

    /// Run this event belongs to.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Fault raised by the work, if any.
    pub fn error(&self) -> Option<&RunError<E>> {
        self.error.as_ref()
    }

    /// True if the work stopped early in response to a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// True if the work finished without a fault and without being cancelled.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.cancelled
    }

    /// Wall time between the worker picking up the run and the work returning.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Consume the event and take the fault out.
    pub fn into_error(self) -> Option<RunError<E>> {
        self.error
    }
}
