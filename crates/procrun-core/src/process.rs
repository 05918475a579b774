//! The unit of work a runner executes.

use tokio_util::sync::CancellationToken;

use crate::ids::RunId;
use crate::status::{RunMode, RunOutcome};

/// A unit of work that can run on the caller's thread or on a runner's worker.
///
/// Implementations that want to honor [`ProcessRunner::cancel`](crate::ProcessRunner::cancel)
/// must check [`RunContext::is_cancelled`] periodically and return
/// [`RunOutcome::Cancelled`] once they stop early. Work that never checks
/// simply runs to completion.
///
/// # Example
///
/// ```rust
/// use procrun_core::{Process, RunContext, RunOutcome};
///
/// struct CountTo(u32);
///
/// impl Process for CountTo {
///     type Error = std::io::Error;
///
///     fn run(&self, ctx: &RunContext) -> Result<RunOutcome, Self::Error> {
///         for _ in 0..self.0 {
///             if ctx.is_cancelled() {
///                 return Ok(RunOutcome::Cancelled);
///             }
///         }
///         Ok(RunOutcome::Completed)
///     }
/// }
/// ```
pub trait Process: Send + Sync + 'static {
    /// Fault type raised by the work.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Executes the work until it finishes, fails or honors cancellation.
    fn run(&self, ctx: &RunContext) -> Result<RunOutcome, Self::Error>;

    /// Human-readable name used in log fields.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Per-run context handed to [`Process::run`].
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: RunId,
    mode: RunMode,
    token: CancellationToken,
}

impl RunContext {
    pub(crate) fn new(run_id: RunId, mode: RunMode, token: CancellationToken) -> Self {
        Self {
            run_id,
            mode,
            token,
        }
    }

    /// Context for a synchronous run. Nothing can cancel it.
    pub(crate) fn sync() -> Self {
        Self::new(RunId::generate(), RunMode::Sync, CancellationToken::new())
    }

    /// True once cancellation was requested for this run.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token for this run, for work that wants to select on `cancelled()`.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }
}
