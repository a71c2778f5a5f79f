//! Lifecycle hooks invoked by a running controller.

use std::fmt;
use std::sync::Arc;

use super::{Settler, Spawn, SpawnError};

/// Called once the process is launched, with the settle handle for its completion.
pub type RunCallback = Arc<dyn Fn(&Spawn, &Settler) + Send + Sync>;
/// Called for each stdout or stderr chunk: a complete line or partial text.
pub type StreamCallback = Arc<dyn Fn(&str) + Send + Sync>;
/// Called after the completion settled, with exit code and terminating signal.
pub type CloseCallback = Arc<dyn Fn(Option<i32>, Option<i32>, &Spawn) + Send + Sync>;
/// Called for each launch-level error.
pub type ErrorCallback = Arc<dyn Fn(&SpawnError) + Send + Sync>;

/// Optional hooks for one controller.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_run: Option<RunCallback>,
    pub on_stdout: Option<StreamCallback>,
    pub on_stderr: Option<StreamCallback>,
    pub on_close: Option<CloseCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_run", &self.on_run.is_some())
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
