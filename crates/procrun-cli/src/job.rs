//! Sample job driven by the CLI.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use procrun_core::{Process, RunContext, RunOutcome};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors raised by the sample job.
#[derive(Debug, Error)]
pub enum JobError {
    /// Injected failure.
    #[error("Step {step} of {total} failed")]
    StepFailed { step: u32, total: u32 },
}

/// Job settings taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct JobSpec {
    pub steps: u32,
    pub step_ms: u64,
    pub fail_at: Option<u32>,
    pub panic_at: Option<u32>,
    pub ignore_cancel: bool,
}

/// Sleeps through a number of steps, checking for cancellation between them.
pub struct SampleJob {
    spec: JobSpec,
    stopped_on_cancel: AtomicBool,
}

impl SampleJob {
    pub fn new(spec: JobSpec) -> Self {
        Self {
            spec,
            stopped_on_cancel: AtomicBool::new(false),
        }
    }

    /// True if the latest run ended early because cancellation was observed.
    pub fn stopped_on_cancel(&self) -> bool {
        self.stopped_on_cancel.load(Ordering::SeqCst)
    }
}

impl Process for SampleJob {
    type Error = JobError;

    fn run(&self, ctx: &RunContext) -> Result<RunOutcome, Self::Error> {
        let total = self.spec.steps;
        self.stopped_on_cancel.store(false, Ordering::SeqCst);
        debug!(run_id = %ctx.run_id(), mode = ?ctx.mode(), total, "Sample job started");

        for step in 1..=total {
            if ctx.is_cancelled() && !self.spec.ignore_cancel {
                debug!(run_id = %ctx.run_id(), step, "Sample job observed cancellation");
                self.stopped_on_cancel.store(true, Ordering::SeqCst);
                return Ok(RunOutcome::Cancelled);
            }
            if self.spec.fail_at == Some(step) {
                return Err(JobError::StepFailed { step, total });
            }
            if self.spec.panic_at == Some(step) {
                panic!("sample job panicked at step {step}");
            }

            std::thread::sleep(Duration::from_millis(self.spec.step_ms));
            trace!(run_id = %ctx.run_id(), step, total, "Step done");
        }

        Ok(RunOutcome::Completed)
    }

    fn name(&self) -> &str {
        "sample-job"
    }
}
