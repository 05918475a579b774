//! Run reports printed to stdout, as text or JSON lines.

use serde::Serialize;
use std::io::{self, Write};

use procrun_core::{CompletionEvent, RunMode, RunnerState};

use crate::job::JobError;

/// How a run ended, from the CLI's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Completed,
    Failed,
    Panicked,
    /// Cancelled runs deliver no completion event.
    CancelledSilently,
    /// The runner refused the run because it was disposed.
    Disposed,
    /// No outcome arrived before the wait deadline.
    TimedOut,
}

/// A single report line.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub kind: ReportKind,
    pub mode: RunMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub state: RunnerState,
}

impl Report {
    /// Build a report from a delivered completion event.
    pub fn from_event(event: &CompletionEvent<JobError>, state: RunnerState) -> Self {
        let kind = match event.error() {
            None => ReportKind::Completed,
            Some(e) if e.is_panic() => ReportKind::Panicked,
            Some(_) => ReportKind::Failed,
        };
        Self {
            kind,
            mode: RunMode::Async,
            run_id: Some(event.run_id().to_string()),
            elapsed_ms: Some(event.elapsed().as_millis() as u64),
            error: event.error().map(|e| e.to_string()),
            state,
        }
    }

    pub fn new(kind: ReportKind, mode: RunMode, state: RunnerState) -> Self {
        Self {
            kind,
            mode,
            run_id: None,
            elapsed_ms: None,
            error: None,
            state,
        }
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_run_id(mut self, run_id: impl ToString) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    /// True if this report describes a faulted run.
    pub fn is_fault(&self) -> bool {
        matches!(self.kind, ReportKind::Failed | ReportKind::Panicked)
    }

    /// Process exit code for this report. Faults and timeouts are non-zero.
    pub fn exit_code(&self) -> i32 {
        if self.is_fault() || self.kind == ReportKind::TimedOut {
            1
        } else {
            0
        }
    }

    /// Render as a single text line.
    pub fn to_text(&self) -> String {
        let mut line = format!("{:?} run: {:?}", self.mode, self.kind);
        if let Some(run_id) = &self.run_id {
            line.push_str(&format!(" [{}]", run_id));
        }
        if let Some(ms) = self.elapsed_ms {
            line.push_str(&format!(" in {}ms", ms));
        }
        if let Some(err) = &self.error {
            line.push_str(&format!(" - {}", err));
        }
        line.push_str(&format!(" (runner {:?})", self.state));
        line
    }

    /// Print to stdout in the requested format.
    pub fn emit(&self, json: bool) {
        let line = if json {
            match serde_json::to_string(self) {
                Ok(line) => line,
                Err(_) => return,
            }
        } else {
            self.to_text()
        };
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{}", line);
        let _ = stdout.flush();
    }
}
