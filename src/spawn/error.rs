//! Spawn error types.

use std::path::PathBuf;
use std::sync::Arc;

/// Environment captured when a launch failure is classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchContext {
    /// Full command line, executable first.
    pub command: Vec<String>,
    /// Working directory of the parent at launch time.
    pub cwd: Option<PathBuf>,
    /// `PATH` of the parent at launch time.
    pub path: Option<String>,
}

impl LaunchContext {
    /// Snapshot the current directory and `PATH` for `command`.
    #[must_use]
    pub fn capture(command: &[String]) -> Self {
        Self {
            command: command.to_vec(),
            cwd: std::env::current_dir().ok(),
            path: std::env::var("PATH").ok(),
        }
    }

    /// The executable, or an empty string for an empty command.
    #[must_use]
    pub fn program(&self) -> &str {
        self.command.first().map_or("", String::as_str)
    }

    /// Every element double quoted and space separated.
    #[must_use]
    pub fn quoted(&self) -> String {
        self.command
            .iter()
            .map(|part| format!("\"{part}\""))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Coarse classification of a [`SpawnError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AlreadyRunning,
    Validation,
    TimeoutConfiguration,
    Timeout,
    CommandNotFound,
    CommandFailed,
    UnexpectedExitCode,
    Abandoned,
}

/// Errors raised while configuring or running a [`Spawn`](super::Spawn).
#[derive(thiserror::Error, Debug, Clone)]
pub enum SpawnError {
    /// `run()` was called on a controller that already started.
    #[error("Command already running")]
    AlreadyRunning,

    /// A configuration value was rejected.
    #[error("{0}")]
    Validation(String),

    /// The deadline had already passed when the run started.
    #[error("Timeout time in the past: {deadline_ms}")]
    TimeoutInPast { deadline_ms: i64 },

    /// The deadline fired while the process was running.
    #[error("Spawn process timed out, killing")]
    TimedOut { deadline_ms: i64 },

    /// The executable could not be found.
    #[error("Command not found: \"{}\"", .context.program())]
    CommandNotFound {
        context: LaunchContext,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The process could not be launched or waited on.
    #[error("Command failed: {}", .context.quoted())]
    CommandFailed {
        context: LaunchContext,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The process exited with a status other than the expected one.
    #[error("Command exited with: \"{}\"", display_code(.code))]
    UnexpectedExitCode { code: Option<i32>, expected: i32 },

    /// The completion was dropped before the controller settled it.
    #[error("Spawn completion dropped before the process finished")]
    Abandoned,
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "null".to_string(), |c| c.to_string())
}

impl SpawnError {
    /// Classify a launch failure, capturing the launch environment.
    #[must_use]
    pub fn from_launch(command: &[String], err: std::io::Error) -> Self {
        let context = LaunchContext::capture(command);
        let source = Arc::new(err);
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::CommandNotFound { context, source },
            _ => Self::CommandFailed { context, source },
        }
    }

    /// Validation error for an expected exit code that is not a non-negative integer.
    #[must_use]
    pub fn invalid_exit_code(value: impl std::fmt::Display) -> Self {
        Self::Validation(format!(
            "Expected exit code should be an integer. Got {value}"
        ))
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyRunning => ErrorKind::AlreadyRunning,
            Self::Validation(_) => ErrorKind::Validation,
            Self::TimeoutInPast { .. } => ErrorKind::TimeoutConfiguration,
            Self::TimedOut { .. } => ErrorKind::Timeout,
            Self::CommandNotFound { .. } => ErrorKind::CommandNotFound,
            Self::CommandFailed { .. } => ErrorKind::CommandFailed,
            Self::UnexpectedExitCode { .. } => ErrorKind::UnexpectedExitCode,
            Self::Abandoned => ErrorKind::Abandoned,
        }
    }

    /// Launch context for launch failures.
    #[must_use]
    pub fn launch_context(&self) -> Option<&LaunchContext> {
        match self {
            Self::CommandNotFound { context, .. } | Self::CommandFailed { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }
}
