//! Runner errors.

use std::any::Any;

use thiserror::Error;

/// Errors returned by the runner itself, as opposed to faults raised by the work.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// An async run is already in flight on this runner.
    #[error("Runner is busy: an async run is already in flight")]
    Busy,

    /// The runner was disposed and no longer owns a worker.
    #[error("Runner has been disposed")]
    Disposed,

    /// The worker runtime could not be created.
    #[error("Failed to start worker runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Fault captured from an async run and carried by its completion event.
#[derive(Debug, Error)]
pub enum RunError<E> {
    /// The work returned an error.
    #[error("Work failed: {0}")]
    Failed(#[source] E),

    /// The work panicked on the worker thread.
    #[error("Work panicked: {0}")]
    Panicked(String),
}

impl<E> RunError<E> {
    /// Returns the work's own error, if this was not a panic.
    pub fn as_failed(&self) -> Option<&E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Panicked(_) => None,
        }
    }

    /// Returns true if the work panicked.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::Panicked(panic_message(payload.as_ref()))
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
