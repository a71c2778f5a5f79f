//! Option types for a single spawn.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::spawn::{Callbacks, Settler, Spawn, SpawnError};

/// Options for one [`Spawn`] run.
///
/// Callbacks are never read from or written to configuration files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnOptions {
    /// Executable followed by its arguments.
    pub command: Vec<String>,
    /// Exit code treated as success.
    pub expected_exit_code: i32,
    /// Treat every exit code as success.
    pub ignore_exit_code: bool,
    /// Relative timeout in milliseconds, applied when the run starts.
    pub timeout_in: Option<u64>,
    /// Absolute deadline as epoch milliseconds.
    pub timeout_at: Option<i64>,
    #[serde(skip)]
    pub callbacks: Callbacks,
}

impl SpawnOptions {
    /// Options for `command` with everything else defaulted.
    #[must_use]
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn expected_exit_code(mut self, code: i32) -> Self {
        self.expected_exit_code = code;
        self
    }

    #[must_use]
    pub fn ignore_exit_code(mut self, ignore: bool) -> Self {
        self.ignore_exit_code = ignore;
        self
    }

    #[must_use]
    pub fn timeout_in(mut self, ms: u64) -> Self {
        self.timeout_in = Some(ms);
        self
    }

    #[must_use]
    pub fn timeout_at(mut self, epoch_ms: i64) -> Self {
        self.timeout_at = Some(epoch_ms);
        self
    }

    #[must_use]
    pub fn on_run(mut self, cb: impl Fn(&Spawn, &Settler) + Send + Sync + 'static) -> Self {
        self.callbacks.on_run = Some(Arc::new(cb));
        self
    }

    #[must_use]
    pub fn on_stdout(mut self, cb: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.callbacks.on_stdout = Some(Arc::new(cb));
        self
    }

    #[must_use]
    pub fn on_stderr(mut self, cb: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.callbacks.on_stderr = Some(Arc::new(cb));
        self
    }

    #[must_use]
    pub fn on_close(
        mut self,
        cb: impl Fn(Option<i32>, Option<i32>, &Spawn) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.on_close = Some(Arc::new(cb));
        self
    }

    #[must_use]
    pub fn on_error(mut self, cb: impl Fn(&SpawnError) + Send + Sync + 'static) -> Self {
        self.callbacks.on_error = Some(Arc::new(cb));
        self
    }
}
