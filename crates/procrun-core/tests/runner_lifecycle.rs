use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use procrun_core::prelude::*;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("step {0} failed")]
struct StepFailed(u32);

/// Work driven by a fixed script of steps.
#[derive(Default)]
struct Scripted {
    steps: u32,
    step: Duration,
    fail_at: Option<u32>,
    panic_at: Option<u32>,
    ignore_cancel: bool,
    /// When set, the first run blocks until the sender side is dropped or signalled.
    gate: Mutex<Option<Receiver<()>>>,
    runs: AtomicUsize,
    finished: AtomicBool,
    saw_cancel: AtomicBool,
}

impl Scripted {
    fn steps(steps: u32, step_ms: u64) -> Self {
        Self {
            steps,
            step: Duration::from_millis(step_ms),
            ..Default::default()
        }
    }

    fn gated(self) -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        *self.gate.lock().unwrap() = Some(rx);
        (self, tx)
    }
}

impl Process for Scripted {
    type Error = StepFailed;

    fn run(&self, ctx: &RunContext) -> Result<RunOutcome, Self::Error> {
        self.runs.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = self.gate.lock().unwrap().take() {
            let _ = gate.recv();
        }

        for n in 1..=self.steps {
            if ctx.is_cancelled() {
                self.saw_cancel.store(true, Ordering::SeqCst);
                if !self.ignore_cancel {
                    self.finished.store(true, Ordering::SeqCst);
                    return Ok(RunOutcome::Cancelled);
                }
            }
            if self.fail_at == Some(n) {
                self.finished.store(true, Ordering::SeqCst);
                return Err(StepFailed(n));
            }
            if self.panic_at == Some(n) {
                panic!("exploded at step {n}");
            }
            std::thread::sleep(self.step);
        }

        self.finished.store(true, Ordering::SeqCst);
        Ok(RunOutcome::Completed)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// What a listener recorded about one event.
#[derive(Debug, Clone, PartialEq)]
struct Seen {
    run_id: RunId,
    failed_at: Option<u32>,
    panicked: bool,
    cancelled: bool,
}

fn record(runner: &ProcessRunner<Scripted>) -> Receiver<Seen> {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    runner.on_complete(move |_work, event| {
        let seen = Seen {
            run_id: event.run_id().clone(),
            failed_at: event.error().and_then(|e| e.as_failed()).map(|e| e.0),
            panicked: event.error().map(|e| e.is_panic()).unwrap_or(false),
            cancelled: event.is_cancelled(),
        };
        let _ = tx.lock().unwrap().send(seen);
    });
    rx
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn process_runs_work_exactly_once_before_returning() {
    let runner = ProcessRunner::new(Scripted::steps(3, 1)).unwrap();
    let rx = record(&runner);

    let outcome = runner.process().unwrap();

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(runner.work().runs.load(Ordering::SeqCst), 1);
    assert!(runner.work().finished.load(Ordering::SeqCst));
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn process_returns_work_error_directly() {
    let runner = ProcessRunner::new(Scripted {
        fail_at: Some(2),
        ..Scripted::steps(3, 1)
    })
    .unwrap();

    assert_eq!(runner.process(), Err(StepFailed(2)));
}

#[test]
fn process_async_returns_before_work_completes() {
    let (work, gate) = Scripted::steps(1, 1).gated();
    let runner = ProcessRunner::new(work).unwrap();
    let rx = record(&runner);

    let run_id = runner.process_async().unwrap();

    assert!(!runner.work().finished.load(Ordering::SeqCst));
    assert!(runner.is_busy());

    gate.send(()).unwrap();
    let seen = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(seen.run_id, run_id);
    assert!(runner.work().finished.load(Ordering::SeqCst));
}

#[test]
fn successful_async_run_fires_exactly_one_clean_event() {
    let runner = ProcessRunner::new(Scripted::steps(2, 1)).unwrap();
    let rx = record(&runner);

    runner.process_async().unwrap();

    let seen = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(seen.failed_at, None);
    assert!(!seen.panicked);
    assert!(!seen.cancelled);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn failed_async_run_carries_the_fault() {
    let runner = ProcessRunner::new(Scripted {
        fail_at: Some(1),
        ..Scripted::steps(3, 1)
    })
    .unwrap();
    let rx = record(&runner);

    runner.process_async().unwrap();

    let seen = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(seen.failed_at, Some(1));
    assert!(!seen.cancelled);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn panicking_async_run_is_captured() {
    let runner = ProcessRunner::new(Scripted {
        panic_at: Some(1),
        ..Scripted::steps(2, 1)
    })
    .unwrap();
    let rx = record(&runner);

    runner.process_async().unwrap();

    let seen = rx.recv_timeout(WAIT).unwrap();
    assert!(seen.panicked);
    assert_eq!(seen.failed_at, None);

    wait_until(|| runner.state() == RunnerState::Completed);
    runner.process_async().unwrap();
    assert!(rx.recv_timeout(WAIT).unwrap().panicked);
}

#[test]
fn cancel_right_after_start_delivers_nothing() {
    let runner = ProcessRunner::new(Scripted::steps(50, 5)).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    runner.on_complete(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    runner.process_async().unwrap();
    runner.cancel();

    wait_until(|| runner.state() == RunnerState::Completed);
    assert!(runner.work().saw_cancel.load(Ordering::SeqCst));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn ignored_cancel_still_completes_normally() {
    let runner = ProcessRunner::new(Scripted {
        ignore_cancel: true,
        ..Scripted::steps(5, 2)
    })
    .unwrap();
    let rx = record(&runner);

    runner.process_async().unwrap();
    runner.cancel();

    let seen = rx.recv_timeout(WAIT).unwrap();
    assert!(!seen.cancelled);
    assert_eq!(seen.failed_at, None);
}

#[test]
fn completed_runner_can_start_again() {
    let runner = ProcessRunner::new(Scripted::steps(1, 1)).unwrap();
    let rx = record(&runner);

    let first = runner.process_async().unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().run_id, first);
    wait_until(|| runner.state() == RunnerState::Completed);

    let second = runner.process_async().unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().run_id, second);
    assert_ne!(first, second);
    assert_eq!(runner.work().runs.load(Ordering::SeqCst), 2);
}

#[test]
fn listener_may_start_the_next_run() {
    let runner = Arc::new(ProcessRunner::new(Scripted::steps(1, 1)).unwrap());
    let rx = record(&runner);

    let weak = Arc::downgrade(&runner);
    let restarted = Arc::new(AtomicBool::new(false));
    let flag = restarted.clone();
    runner.on_complete(move |_, _| {
        if !flag.swap(true, Ordering::SeqCst) {
            if let Some(runner) = weak.upgrade() {
                runner.process_async().unwrap();
            }
        }
    });

    runner.process_async().unwrap();

    rx.recv_timeout(WAIT).unwrap();
    rx.recv_timeout(WAIT).unwrap();
    assert_eq!(runner.work().runs.load(Ordering::SeqCst), 2);
    runner.dispose();
}

#[test]
fn unsubscribed_listener_is_not_called() {
    let runner = ProcessRunner::new(Scripted::steps(1, 1)).unwrap();
    let rx = record(&runner);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let id = runner.on_complete(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(runner.unsubscribe(id));
    assert_eq!(runner.subscriber_count(), 1);

    runner.process_async().unwrap();
    rx.recv_timeout(WAIT).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn dispose_twice_is_harmless() {
    let runner = ProcessRunner::new(Scripted::steps(1, 1)).unwrap();
    let _rx = record(&runner);

    runner.dispose();
    runner.dispose();

    assert!(runner.is_disposed());
    assert_eq!(runner.state(), RunnerState::Disposed);
    assert_eq!(runner.subscriber_count(), 0);
}

#[test]
fn disposed_runner_refuses_async_runs() {
    let runner = ProcessRunner::new(Scripted::steps(1, 1)).unwrap();
    runner.dispose();

    assert!(matches!(runner.process_async(), Err(RunnerError::Disposed)));
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(runner.work().runs.load(Ordering::SeqCst), 0);
}

#[test]
fn dispose_cancels_in_flight_run_and_stays_silent() {
    let (work, gate) = Scripted::steps(20, 5).gated();
    let runner = ProcessRunner::new(work).unwrap();
    let rx = record(&runner);

    runner.process_async().unwrap();
    wait_until(|| runner.work().runs.load(Ordering::SeqCst) == 1);

    runner.dispose();
    gate.send(()).unwrap();

    wait_until(|| runner.work().finished.load(Ordering::SeqCst));
    assert!(runner.work().saw_cancel.load(Ordering::SeqCst));
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn disposed_runner_drops_completion_of_stubborn_work() {
    let (work, gate) = Scripted {
        ignore_cancel: true,
        ..Scripted::steps(2, 1)
    }
    .gated();
    let runner = ProcessRunner::new(work).unwrap();
    let rx = record(&runner);

    runner.process_async().unwrap();
    wait_until(|| runner.work().runs.load(Ordering::SeqCst) == 1);
    runner.dispose();
    gate.send(()).unwrap();

    wait_until(|| runner.work().finished.load(Ordering::SeqCst));
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn custom_config_is_kept() {
    let cfg = RunnerConfig::default()
        .with_thread_name("indexer")
        .with_keep_alive(Duration::from_millis(100));
    let runner = ProcessRunner::with_config(Scripted::steps(1, 1), cfg).unwrap();

    assert_eq!(runner.config().thread_name, "indexer");

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    runner.on_complete(move |_, _| {
        let name = std::thread::current().name().map(str::to_string);
        let _ = tx.lock().unwrap().send(name);
    });
    runner.process_async().unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap().as_deref(), Some("indexer"));
}
