//! procrun CLI - drives a sample job through the runner's entry points.

use std::sync::mpsc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use procrun_core::{ProcessRunner, RunId, RunMode, RunnerConfig, RunnerState};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod job;
mod report;

use job::{JobSpec, SampleJob};
use report::{Report, ReportKind};

/// procrun - run a sample job synchronously or on a background worker
#[derive(Parser)]
#[command(name = "procrun")]
#[command(about = "Exercise procrun's sync, async, cancel and dispose paths", long_about = None)]
struct Cli {
    /// Log filter (EnvFilter syntax). RUST_LOG takes precedence when set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print reports as JSON lines
    #[arg(long)]
    json: bool,

    /// Name of the runner's worker thread
    #[arg(long, default_value = "procrun-worker")]
    thread_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct JobArgs {
    /// Number of steps the job performs
    #[arg(long, default_value_t = 10)]
    steps: u32,

    /// Duration of one step in milliseconds
    #[arg(long, default_value_t = 50)]
    step_ms: u64,

    /// Fail at this step
    #[arg(long)]
    fail_at: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the job on the calling thread
    #[command(name = "run-sync")]
    RunSync {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Run the job on the background worker and wait for its completion
    #[command(name = "run-async")]
    RunAsync {
        #[command(flatten)]
        job: JobArgs,

        /// Panic at this step
        #[arg(long)]
        panic_at: Option<u32>,

        /// Request cancellation after this many milliseconds
        #[arg(long)]
        cancel_after_ms: Option<u64>,

        /// Keep running when cancellation is requested
        #[arg(long)]
        ignore_cancel: bool,

        /// Give up waiting for the run after this many seconds
        #[arg(long, default_value_t = 600)]
        wait_secs: u64,
    },

    /// Start a run, dispose twice, then try to start again
    #[command(name = "dispose-twice")]
    DisposeTwice {
        #[command(flatten)]
        job: JobArgs,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = RunnerConfig::default().with_thread_name(cli.thread_name.clone());

    let report = match cli.command {
        Commands::RunSync { job } => run_sync(config, job)?,
        Commands::RunAsync {
            job,
            panic_at,
            cancel_after_ms,
            ignore_cancel,
            wait_secs,
        } => {
            let spec = JobSpec {
                panic_at,
                ignore_cancel,
                ..job_spec(&job)
            };
            run_async(
                config,
                spec,
                cancel_after_ms.map(Duration::from_millis),
                Duration::from_secs(wait_secs),
            )?
        }
        Commands::DisposeTwice { job } => dispose_twice(config, job)?,
    };

    report.emit(cli.json);
    let code = report.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Install the global tracing subscriber, writing to stderr.
fn init_logging(log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| e as Box<dyn std::error::Error>)?;
    Ok(())
}

fn job_spec(args: &JobArgs) -> JobSpec {
    JobSpec {
        steps: args.steps,
        step_ms: args.step_ms,
        fail_at: args.fail_at,
        ..Default::default()
    }
}

fn run_sync(config: RunnerConfig, job: JobArgs) -> Result<Report, Box<dyn std::error::Error>> {
    let runner = ProcessRunner::with_config(SampleJob::new(job_spec(&job)), config)?;

    // Nothing can cancel a sync run from here, so any Ok outcome is a completion.
    let report = match runner.process() {
        Ok(_) => Report::new(ReportKind::Completed, RunMode::Sync, runner.state()),
        Err(e) => Report::new(ReportKind::Failed, RunMode::Sync, runner.state()).with_error(e),
    };
    Ok(report)
}

fn run_async(
    config: RunnerConfig,
    spec: JobSpec,
    cancel_after: Option<Duration>,
    wait: Duration,
) -> Result<Report, Box<dyn std::error::Error>> {
    let runner = ProcessRunner::with_config(SampleJob::new(spec), config)?;

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    runner.on_complete(move |_job, event| {
        let report = Report::from_event(event, RunnerState::Completed);
        if let Ok(tx) = tx.lock() {
            let _ = tx.send(report);
        }
    });

    let run_id = runner.process_async()?;
    info!(run_id = %run_id, "Async run started, caller continues");

    let mut cancel_requested = false;
    if let Some(delay) = cancel_after {
        std::thread::sleep(delay);
        runner.cancel();
        cancel_requested = true;
    }

    let report = await_completion(&runner, &rx, &run_id, cancel_requested, Instant::now() + wait);
    runner.dispose();
    Ok(report)
}

/// Wait for the run's outcome.
///
/// Cancelled runs never deliver, so a run that stopped on a requested cancel is
/// read off the job once the runner is idle. Any other run keeps waiting for
/// its completion event until `deadline`.
fn await_completion(
    runner: &ProcessRunner<SampleJob>,
    rx: &mpsc::Receiver<Report>,
    run_id: &RunId,
    cancel_requested: bool,
    deadline: Instant,
) -> Report {
    loop {
        match rx.recv_timeout(Duration::from_millis(20)) {
            Ok(report) => return report,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Report::new(ReportKind::Failed, RunMode::Async, runner.state())
                    .with_run_id(run_id)
                    .with_error("completion channel closed before the run reported");
            }
        }

        if cancel_requested && !runner.is_busy() && runner.work().stopped_on_cancel() {
            return Report::new(ReportKind::CancelledSilently, RunMode::Async, runner.state())
                .with_run_id(run_id);
        }
        if Instant::now() >= deadline {
            debug!(run_id = %run_id, "Gave up waiting for the async run");
            return Report::new(ReportKind::TimedOut, RunMode::Async, runner.state())
                .with_run_id(run_id);
        }
    }
}

fn dispose_twice(config: RunnerConfig, job: JobArgs) -> Result<Report, Box<dyn std::error::Error>> {
    let runner = ProcessRunner::with_config(SampleJob::new(job_spec(&job)), config)?;
    runner.on_complete(|_job, event| {
        info!(run_id = %event.run_id(), "Completion delivered before dispose");
    });

    let run_id = runner.process_async()?;
    runner.dispose();
    runner.dispose();

    let report = match runner.process_async() {
        Ok(late) => Report::new(ReportKind::Failed, RunMode::Async, runner.state())
            .with_run_id(late)
            .with_error("runner accepted a run after dispose"),
        Err(e) => Report::new(ReportKind::Disposed, RunMode::Async, runner.state())
            .with_run_id(run_id)
            .with_error(e),
    };
    Ok(report)
}
