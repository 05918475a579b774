//! Runner that executes one unit of work synchronously or on a background worker.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::error::{RunError, RunnerError};
use crate::event::CompletionEvent;
use crate::ids::{RunId, SubscriptionId};
use crate::listener::{CompletionListener, Listeners};
use crate::process::{Process, RunContext};
use crate::status::{RunMode, RunOutcome, RunnerState};

/// State shared between the runner and its worker thread.
struct Shared<P: Process> {
    work: P,
    state: Mutex<RunnerState>,
    /// Token of the run in flight, if any.
    token: Mutex<Option<CancellationToken>>,
    listeners: Listeners<P>,
    /// Cleared on dispose; a detached worker never notifies.
    attached: AtomicBool,
}

impl<P: Process> Shared<P> {
    /// Body of an async run. Executes on the worker thread.
    fn execute(&self, ctx: RunContext) {
        let work = self.work.name();
        debug!(run_id = %ctx.run_id(), work, "Worker picked up run");

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.work.run(&ctx)));
        let elapsed = started.elapsed();

        let (error, cancelled) = match result {
            Ok(Ok(outcome)) => (None, outcome.is_cancelled()),
            Ok(Err(e)) => (Some(RunError::Failed(e)), false),
            Err(payload) => (Some(RunError::from_panic(payload)), false),
        };

        {
            let mut state = lock(&self.state);
            if !state.is_terminal() {
                *state = RunnerState::Completed;
            }
            *lock(&self.token) = None;
        }

        let event = CompletionEvent::new(ctx.run_id().clone(), error, cancelled, elapsed);
        let elapsed_ms = elapsed.as_millis() as u64;

        match event.error() {
            None if cancelled => {
                info!(run_id = %ctx.run_id(), work, elapsed_ms, "Async run cancelled");
            }
            None => {
                info!(run_id = %ctx.run_id(), work, elapsed_ms, "Async run completed");
            }
            Some(e) if e.is_panic() => {
                error!(run_id = %ctx.run_id(), work, elapsed_ms, error = %e, "Async run panicked");
            }
            Some(e) => {
                warn!(run_id = %ctx.run_id(), work, elapsed_ms, error = %e, "Async run failed");
            }
        }

        if cancelled {
            debug!(run_id = %ctx.run_id(), "Completion suppressed for cancelled run");
            return;
        }
        if !self.attached.load(Ordering::Acquire) {
            debug!(run_id = %ctx.run_id(), "Completion dropped: runner disposed");
            return;
        }

        let notified = self.listeners.notify(&self.work, &event);
        debug!(run_id = %ctx.run_id(), listeners = notified, "Completion delivered");
    }
}

/// Owns one unit of work and the worker that runs it in the background.
///
/// - [`process`](Self::process) runs the work on the calling thread and
///   returns its result directly. No completion event is fired.
/// - [`process_async`](Self::process_async) hands the work to the worker and
///   returns immediately. When the work returns, one [`CompletionEvent`] is
///   built and delivered to every listener on the worker thread, unless the
///   work reported [`RunOutcome::Cancelled`], in which case nothing is
///   delivered.
/// - [`cancel`](Self::cancel) flips the in-flight run's token. The work
///   decides whether to honor it.
/// - [`dispose`](Self::dispose) cancels an in-flight run, drops every
///   listener and releases the worker. It runs at most once and is also
///   called on drop.
///
/// # Example
///
/// ```rust,no_run
/// use procrun_core::{Process, ProcessRunner, RunContext, RunOutcome};
///
/// struct Compact;
///
/// impl Process for Compact {
///     type Error = std::io::Error;
///
///     fn run(&self, ctx: &RunContext) -> Result<RunOutcome, Self::Error> {
///         for _segment in 0..64 {
///             if ctx.is_cancelled() {
///                 return Ok(RunOutcome::Cancelled);
///             }
///             // compact one segment...
///         }
///         Ok(RunOutcome::Completed)
///     }
/// }
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let runner = ProcessRunner::new(Compact)?;
///     runner.on_complete(|_work, event| {
///         println!("done, success = {}", event.is_success());
///     });
///
///     runner.process_async()?;
///     runner.dispose();
///     Ok(())
/// }
/// ```
pub struct ProcessRunner<P: Process> {
    shared: Arc<Shared<P>>,
    /// Worker execution resource. Taken on dispose.
    runtime: Mutex<Option<Runtime>>,
    disposed: AtomicBool,
    config: RunnerConfig,
}

impl<P: Process> ProcessRunner<P> {
    /// Create a runner with the default configuration.
    pub fn new(work: P) -> Result<Self, RunnerError> {
        Self::with_config(work, RunnerConfig::default())
    }

    /// Create a runner with a custom configuration.
    pub fn with_config(work: P, config: RunnerConfig) -> Result<Self, RunnerError> {
        let runtime = build_runtime(&config)?;
        debug!(work = work.name(), thread_name = %config.thread_name, "Runner created");

        Ok(Self {
            shared: Arc::new(Shared {
                work,
                state: Mutex::new(RunnerState::Idle),
                token: Mutex::new(None),
                listeners: Listeners::new(),
                attached: AtomicBool::new(true),
            }),
            runtime: Mutex::new(Some(runtime)),
            disposed: AtomicBool::new(false),
            config,
        })
    }

    /// Run the work on the calling thread and block until it returns.
    ///
    /// Errors and panics from the work propagate to the caller unchanged.
    /// The runner state is not touched and no completion event is fired.
    pub fn process(&self) -> Result<RunOutcome, P::Error> {
        let ctx = RunContext::sync();
        let work = self.shared.work.name();
        debug!(run_id = %ctx.run_id(), work, "Running work on caller thread");

        let started = Instant::now();
        let result = self.shared.work.run(&ctx);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(outcome) => info!(run_id = %ctx.run_id(), work, elapsed_ms, outcome = ?outcome, "Sync run finished"),
            Err(e) => warn!(run_id = %ctx.run_id(), work, elapsed_ms, error = %e, "Sync run failed"),
        }
        result
    }

    /// Schedule the work on the worker thread and return immediately.
    ///
    /// Fails with [`RunnerError::Busy`] while a previous async run is in
    /// flight, and with [`RunnerError::Disposed`] after [`dispose`](Self::dispose).
    pub fn process_async(&self) -> Result<RunId, RunnerError> {
        let guard = lock(&self.runtime);
        let Some(runtime) = guard.as_ref() else {
            warn!(work = self.shared.work.name(), "Async run rejected: runner disposed");
            return Err(RunnerError::Disposed);
        };

        let token = CancellationToken::new();
        {
            let mut state = lock(&self.shared.state);
            if !state.can_start() {
                if state.is_terminal() {
                    return Err(RunnerError::Disposed);
                }
                warn!(work = self.shared.work.name(), state = ?*state, "Async run rejected: runner busy");
                return Err(RunnerError::Busy);
            }
            *state = RunnerState::Running;
            *lock(&self.shared.token) = Some(token.clone());
        }

        let run_id = RunId::generate();
        let ctx = RunContext::new(run_id.clone(), RunMode::Async, token);
        let shared = Arc::clone(&self.shared);

        info!(run_id = %run_id, work = self.shared.work.name(), "Starting async run");
        runtime.spawn_blocking(move || shared.execute(ctx));

        Ok(run_id)
    }

    /// Request cooperative cancellation of the in-flight async run.
    ///
    /// Does nothing if no async run is in flight.
    pub fn cancel(&self) {
        let mut state = lock(&self.shared.state);
        if !state.is_busy() {
            debug!(state = ?*state, "Cancel ignored: no async run in flight");
            return;
        }

        if let Some(token) = lock(&self.shared.token).as_ref() {
            token.cancel();
        }
        *state = RunnerState::CancelRequested;
        info!(work = self.shared.work.name(), "Cancellation requested");
    }

    /// Release the worker.
    ///
    /// Cancels an in-flight run, removes every listener, then shuts the
    /// worker down without waiting for it. Only the first call has an effect.
    /// A run that ignores cancellation keeps going on its thread until it
    /// returns, but its completion is never delivered.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            debug!("Dispose ignored: already disposed");
            return;
        }

        {
            let mut state = lock(&self.shared.state);
            if state.is_busy() {
                if let Some(token) = lock(&self.shared.token).as_ref() {
                    token.cancel();
                }
                debug!(state = ?*state, "Cancelled in-flight run before dispose");
            }
            *state = RunnerState::Disposed;
        }

        self.shared.attached.store(false, Ordering::Release);
        let removed = self.shared.listeners.clear();

        let runtime = lock(&self.runtime).take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }

        info!(
            work = self.shared.work.name(),
            removed_listeners = removed,
            "Runner disposed"
        );
    }

    /// Register a completion listener.
    ///
    /// Listeners registered after dispose are kept but never called.
    pub fn subscribe<L>(&self, listener: L) -> SubscriptionId
    where
        L: CompletionListener<P>,
    {
        self.shared.listeners.subscribe(Arc::new(listener))
    }

    /// Register a closure as a completion listener.
    pub fn on_complete<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&P, &CompletionEvent<P::Error>) + Send + Sync + 'static,
    {
        self.subscribe(f)
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.listeners.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.listeners.len()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunnerState {
        *lock(&self.shared.state)
    }

    /// True while an async run is in flight.
    pub fn is_busy(&self) -> bool {
        self.state().is_busy()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// The work this runner owns.
    pub fn work(&self) -> &P {
        &self.shared.work
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }
}

impl<P: Process> Drop for ProcessRunner<P> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<P: Process> fmt::Debug for ProcessRunner<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("work", &self.shared.work.name())
            .field("state", &self.state())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// One dedicated blocking thread, reused across runs while it stays warm.
fn build_runtime(config: &RunnerConfig) -> std::io::Result<Runtime> {
    Builder::new_current_thread()
        .max_blocking_threads(1)
        .thread_name(config.thread_name.clone())
        .thread_keep_alive(config.keep_alive)
        .build()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
