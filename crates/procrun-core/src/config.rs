//! Runner configuration.

use std::time::Duration;

/// Runner configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Name given to the worker thread.
    pub thread_name: String,

    /// How long an idle worker thread is kept before it exits.
    /// The next `process_async` recreates it.
    pub keep_alive: Duration,
}

impl RunnerConfig {
    /// Set the worker thread name.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the idle keep-alive of the worker thread.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            thread_name: "procrun-worker".to_string(),
            keep_alive: Duration::from_secs(10),
        }
    }
}
