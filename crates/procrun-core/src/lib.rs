//! procrun core
//!
//! Runs one unit of work either on the caller's thread or on a dedicated
//! background worker, with cooperative cancellation and a single completion
//! notification per background run.
//!
//! - [`Process`] is implemented by the work itself.
//! - [`ProcessRunner`] owns the work and the worker, and exposes
//!   `process`, `process_async`, `cancel` and `dispose`.
//! - [`CompletionEvent`] tells listeners how a background run ended.

pub mod config;
pub mod error;
pub mod event;
pub mod ids;
mod listener;
pub mod process;
pub mod runner;
pub mod status;

// Re-export commonly used types
pub use config::RunnerConfig;
pub use error::{RunError, RunnerError};
pub use event::CompletionEvent;
pub use ids::{RunId, SubscriptionId};
pub use listener::CompletionListener;
pub use process::{Process, RunContext};
pub use runner::ProcessRunner;
pub use status::{RunMode, RunOutcome, RunnerState};

pub mod prelude {
    pub use crate::{
        CompletionEvent, CompletionListener, Process, ProcessRunner, RunContext, RunError, RunId,
        RunOutcome, RunnerConfig, RunnerError, RunnerState, SubscriptionId,
    };
}
