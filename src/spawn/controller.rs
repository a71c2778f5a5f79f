//! Single-run controller for one child process.
//!
//! A [`Spawn`] launches its command once, records stdout and stderr lines in
//! arrival order, enforces an optional deadline and settles a [`Completion`]
//! exactly once when the process closes.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::os::unix::process::ExitStatusExt;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use serde::{Serialize, Serializer};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::callbacks::Callbacks;
use super::deadline;
use super::error::{LaunchContext, SpawnError};
use super::event::{lines_of, EventKind, OutputEvent};
use super::state::LifecycleState;
use crate::config::SpawnOptions;

/// Derived line views are only cached below this many lines.
pub const MEMO_LINE_LIMIT: usize = 5000;

/// Offset added to a terminating signal number to form an exit code.
const SIGNAL_EXIT_BASE: i32 = 128;

/// Size of each read from a child output pipe.
const READ_CHUNK: usize = 8192;

/// Fallback interval for checking child exit when SIGCHLD is missed.
const REAP_POLL: Duration = Duration::from_millis(100);

type Outcome = Result<Spawn, SpawnError>;

/// Settles a [`Completion`]. Only the first call to `resolve` or `reject` wins.
#[derive(Clone)]
pub struct Settler {
    tx: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

impl Settler {
    fn channel() -> (Self, Completion) {
        let (tx, rx) = oneshot::channel();
        let settler = Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        };
        (settler, Completion { rx })
    }

    /// Resolve with `spawn`. Returns `false` if already settled.
    pub fn resolve(&self, spawn: Spawn) -> bool {
        self.settle(Ok(spawn))
    }

    /// Reject with `err`. Returns `false` if already settled.
    pub fn reject(&self, err: SpawnError) -> bool {
        self.settle(Err(err))
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn settle(&self, outcome: Outcome) -> bool {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        match tx {
            Some(tx) => {
                // The caller may have dropped the completion; the run still counts as settled.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Settler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settler")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Resolves once with the controller, or with the error that ended the run.
#[derive(Debug)]
#[must_use = "a completion does nothing unless awaited; the process runs regardless"]
pub struct Completion {
    rx: oneshot::Receiver<Outcome>,
}

impl Future for Completion {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SpawnError::Abandoned)))
    }
}

/// Diagnostic view of a controller.
#[derive(Debug, Clone, Serialize)]
pub struct SpawnSnapshot {
    pub command: Vec<String>,
    pub errors: Vec<String>,
    pub output: Vec<OutputEvent>,
    pub running: bool,
    pub started: bool,
    pub finished: bool,
    pub timeout_at: Option<i64>,
    pub timeout_in: Option<u64>,
}

#[derive(Default)]
struct State {
    command: Vec<String>,
    expected_exit_code: i32,
    ignore_exit_code: bool,
    timeout_in: Option<u64>,
    timeout_at: Option<i64>,
    callbacks: Callbacks,
    lifecycle: LifecycleState,
    output: Vec<OutputEvent>,
    errors: Vec<SpawnError>,
    exit_code: Option<i32>,
    signal: Option<i32>,
    /// Present until reaped; signals are only sent while holding it.
    child: Option<Child>,
    stdout_memo: Option<Arc<Vec<String>>>,
    stderr_memo: Option<Arc<Vec<String>>>,
}

struct Inner {
    state: Mutex<State>,
    timer: CancellationToken,
}

/// Controller for a single run of an external command.
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct Spawn {
    inner: Arc<Inner>,
}

impl Default for Spawn {
    fn default() -> Self {
        Self::new()
    }
}

impl Spawn {
    /// Create an unconfigured controller.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                timer: CancellationToken::new(),
            }),
        }
    }

    /// Create a controller from options.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::Validation` if the expected exit code is negative.
    pub fn with_options(options: SpawnOptions) -> Result<Self, SpawnError> {
        let spawn = Self::new();
        {
            let mut state = spawn.lock();
            state.expected_exit_code = validate_exit_code(options.expected_exit_code)?;
            state.command = options.command;
            state.ignore_exit_code = options.ignore_exit_code;
            state.timeout_in = options.timeout_in;
            state.timeout_at = options.timeout_at;
            state.callbacks = options.callbacks;
        }
        Ok(spawn)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock for configuration, refusing once the run has started.
    fn configure(&self) -> Result<MutexGuard<'_, State>, SpawnError> {
        let state = self.lock();
        if state.lifecycle.started() {
            return Err(SpawnError::AlreadyRunning);
        }
        Ok(state)
    }

    /// Set the command line, executable first.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::AlreadyRunning` once the run has started.
    pub fn set_command<I, S>(&self, command: I) -> Result<(), SpawnError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.configure()?.command = command.into_iter().map(Into::into).collect();
        Ok(())
    }

    /// Set the exit code treated as success.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::Validation` for a negative code, or
    /// `SpawnError::AlreadyRunning` once the run has started.
    pub fn set_expected_exit_code(&self, code: i32) -> Result<(), SpawnError> {
        let code = validate_exit_code(code)?;
        self.configure()?.expected_exit_code = code;
        Ok(())
    }

    /// Parse and set the exit code treated as success.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::Validation` unless `value` is all ASCII digits.
    pub fn set_expected_exit_code_str(&self, value: &str) -> Result<(), SpawnError> {
        self.set_expected_exit_code(parse_exit_code(value)?)
    }

    /// Treat every exit code as success.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::AlreadyRunning` once the run has started.
    pub fn ignore_exit_code(&self, ignore: bool) -> Result<(), SpawnError> {
        self.configure()?.ignore_exit_code = ignore;
        Ok(())
    }

    /// Kill the process this many milliseconds after `run()`.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::AlreadyRunning` once the run has started.
    pub fn set_timeout_in(&self, ms: u64) -> Result<(), SpawnError> {
        self.configure()?.timeout_in = Some(ms);
        Ok(())
    }

    /// Kill the process at this epoch millisecond timestamp.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::AlreadyRunning` once the run has started.
    pub fn set_timeout_at(&self, epoch_ms: i64) -> Result<(), SpawnError> {
        self.configure()?.timeout_at = Some(epoch_ms);
        Ok(())
    }

    pub fn on_run(&self, cb: impl Fn(&Spawn, &Settler) + Send + Sync + 'static) {
        self.lock().callbacks.on_run = Some(Arc::new(cb));
    }

    pub fn on_stdout(&self, cb: impl Fn(&str) + Send + Sync + 'static) {
        self.lock().callbacks.on_stdout = Some(Arc::new(cb));
    }

    pub fn on_stderr(&self, cb: impl Fn(&str) + Send + Sync + 'static) {
        self.lock().callbacks.on_stderr = Some(Arc::new(cb));
    }

    pub fn on_close(&self, cb: impl Fn(Option<i32>, Option<i32>, &Spawn) + Send + Sync + 'static) {
        self.lock().callbacks.on_close = Some(Arc::new(cb));
    }

    pub fn on_error(&self, cb: impl Fn(&SpawnError) + Send + Sync + 'static) {
        self.lock().callbacks.on_error = Some(Arc::new(cb));
    }

    /// Launch the command and return its completion.
    ///
    /// Must be called from within a tokio runtime. A deadline that has
    /// already passed rejects the completion without launching anything.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::AlreadyRunning` on a second call and
    /// `SpawnError::Validation` for an empty command. Failures after that
    /// point are delivered through the returned [`Completion`].
    pub fn run(&self) -> Result<Completion, SpawnError> {
        let (settler, completion) = Settler::channel();

        let (command, deadline) = {
            let mut state = self.lock();
            if state.lifecycle.started() {
                return Err(SpawnError::AlreadyRunning);
            }
            if state.command.is_empty() {
                return Err(SpawnError::Validation(
                    "command must not be empty".to_string(),
                ));
            }

            let now = deadline::now_ms();
            let deadline = deadline::resolve_deadline(state.timeout_in, state.timeout_at, now);
            let mut armed = None;
            if let Some(at) = deadline {
                state.timeout_at = Some(at);
                match deadline::remaining(at, now) {
                    Some(after) => armed = Some((at, after)),
                    None => {
                        state.lifecycle.advance(LifecycleState::Finished);
                        drop(state);
                        tracing::warn!(deadline_ms = at, "Deadline already passed, not launching");
                        settler.reject(SpawnError::TimeoutInPast { deadline_ms: at });
                        return Ok(completion);
                    }
                }
            }
            (state.command.clone(), armed)
        };

        let launched = Command::new(&command[0])
            .args(&command[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let (launched, on_run) = {
            let mut state = self.lock();
            state.lifecycle.advance(LifecycleState::Running);
            let launched = launched.map(|mut child| {
                let pipes = (child.stdout.take(), child.stderr.take());
                state.child = Some(child);
                pipes
            });
            (launched, state.callbacks.on_run.clone())
        };
        tracing::debug!(
            command = %display_command(&command),
            pid = ?self.pid(),
            "Launched process"
        );
        if let Some(cb) = on_run {
            cb(self, &settler);
        }

        match launched {
            Err(err) => {
                self.record_error(SpawnError::from_launch(&command, err));
                self.close(None, None, &settler);
            }
            Ok((stdout, stderr)) => {
                if let Some((at, after)) = deadline {
                    let spawn = self.clone();
                    deadline::arm(after, self.inner.timer.clone(), move || {
                        spawn.deadline_reached(at);
                    });
                }
                tokio::spawn(self.clone().supervise(stdout, stderr, settler));
            }
        }

        Ok(completion)
    }

    async fn supervise(
        self,
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
        settler: Settler,
    ) {
        let stdout = stdout.map(|out| tokio::spawn(pump(self.clone(), out, EventKind::Stdout)));
        let stderr = stderr.map(|err| tokio::spawn(pump(self.clone(), err, EventKind::Stderr)));

        let status = self.reap().await;
        self.inner.timer.cancel();

        for reader in [stdout, stderr].into_iter().flatten() {
            if let Err(e) = reader.await {
                tracing::warn!(error = %e, "Output reader task failed");
            }
        }

        match status {
            Ok(status) => self.close(status.code(), status.signal(), &settler),
            Err(err) => {
                let command = self.command();
                self.record_error(SpawnError::CommandFailed {
                    context: LaunchContext::capture(&command),
                    source: Arc::new(err),
                });
                self.close(None, None, &settler);
            }
        }
    }

    /// Wait for the child to exit, reaping it under the state lock so that
    /// `kill` never sees a pid that has already been released.
    async fn reap(&self) -> std::io::Result<ExitStatus> {
        let mut sigchld = match signal(SignalKind::child()) {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::debug!(error = %e, "SIGCHLD unavailable, polling for exit");
                None
            }
        };

        loop {
            {
                let mut state = self.lock();
                let Some(child) = state.child.as_mut() else {
                    return Err(std::io::Error::other("child handle already released"));
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        state.child = None;
                        return Ok(status);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        state.child = None;
                        return Err(e);
                    }
                }
            }

            match sigchld.as_mut() {
                Some(stream) => {
                    tokio::select! {
                        _ = stream.recv() => {}
                        () = tokio::time::sleep(REAP_POLL) => {}
                    }
                }
                None => tokio::time::sleep(REAP_POLL).await,
            }
        }
    }

    fn handle_chunk(&self, kind: EventKind, text: String) {
        let cb = {
            let mut state = self.lock();
            let cb = match kind {
                EventKind::Stderr => state.callbacks.on_stderr.clone(),
                _ => state.callbacks.on_stdout.clone(),
            };
            let event = match kind {
                EventKind::Stderr => OutputEvent::Stderr(text.clone()),
                _ => OutputEvent::Stdout(text.clone()),
            };
            state.output.push(event);
            cb
        };
        if let Some(cb) = cb {
            cb(&text);
        }
    }

    fn record_error(&self, err: SpawnError) {
        tracing::debug!(error = %err, "Spawn error");
        let cb = {
            let mut state = self.lock();
            state.output.push(OutputEvent::Error(err.to_string()));
            state.errors.push(err.clone());
            state.callbacks.on_error.clone()
        };
        if let Some(cb) = cb {
            cb(&err);
        }
    }

    fn deadline_reached(&self, deadline_ms: i64) {
        let mut state = self.lock();
        let Some(sent) = signal_child(&state, Signal::SIGTERM) else {
            return;
        };
        state.errors.push(SpawnError::TimedOut { deadline_ms });
        drop(state);

        tracing::warn!(deadline_ms, "Spawn process timed out, killing");
        if let Err(e) = sent {
            tracing::warn!(error = %e, "Failed to signal timed out process");
        }
    }

    fn close(&self, code: Option<i32>, signal: Option<i32>, settler: &Settler) {
        let exit_code = code.or_else(|| signal.map(|s| SIGNAL_EXIT_BASE + s));

        let (outcome, on_close) = {
            let mut state = self.lock();
            state.lifecycle.advance(LifecycleState::Finished);
            state.exit_code = exit_code;
            state.signal = signal;
            state.output.push(OutputEvent::Close(exit_code));

            let expected = state.expected_exit_code;
            let accepted =
                exit_code.is_some_and(|c| state.ignore_exit_code || c == expected);
            let outcome = if accepted {
                Ok(())
            } else {
                Err(state
                    .errors
                    .first()
                    .cloned()
                    .unwrap_or_else(|| SpawnError::UnexpectedExitCode {
                        code: exit_code,
                        expected,
                    }))
            };
            (outcome, state.callbacks.on_close.clone())
        };
        self.inner.timer.cancel();

        tracing::debug!(exit_code = ?exit_code, signal = ?signal, "Process closed");
        let settled = match outcome {
            Ok(()) => settler.resolve(self.clone()),
            Err(err) => settler.reject(err),
        };
        if !settled {
            tracing::debug!("Completion was already settled");
        }

        if let Some(cb) = on_close {
            cb(exit_code, signal, self);
        }
    }

    /// Send `signal` to the process if it is running.
    ///
    /// Returns `None` when there is nothing to signal: not started yet,
    /// or already finished.
    pub fn kill(&self, signal: Signal) -> Option<nix::Result<()>> {
        signal_child(&self.lock(), signal)
    }

    /// Send SIGTERM to the process if it is running.
    pub fn terminate(&self) -> Option<nix::Result<()>> {
        self.kill(Signal::SIGTERM)
    }

    #[must_use]
    pub fn command(&self) -> Vec<String> {
        self.lock().command.clone()
    }

    /// Full event log in arrival order.
    #[must_use]
    pub fn output(&self) -> Vec<OutputEvent> {
        self.lock().output.clone()
    }

    #[must_use]
    pub fn errors(&self) -> Vec<SpawnError> {
        self.lock().errors.clone()
    }

    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.lock().exit_code
    }

    /// Signal that terminated the process, if any.
    #[must_use]
    pub fn signal(&self) -> Option<i32> {
        self.lock().signal
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.lock().child.as_ref().and_then(Child::id)
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lock().lifecycle
    }

    #[must_use]
    pub fn started(&self) -> bool {
        self.state().started()
    }

    #[must_use]
    pub fn running(&self) -> bool {
        self.state().running()
    }

    #[must_use]
    pub fn finished(&self) -> bool {
        self.state().finished()
    }

    /// Absolute deadline; a relative timeout shows up here once the run starts.
    #[must_use]
    pub fn timeout_at(&self) -> Option<i64> {
        self.lock().timeout_at
    }

    #[must_use]
    pub fn timeout_in(&self) -> Option<u64> {
        self.lock().timeout_in
    }

    #[must_use]
    pub fn expected_exit_code(&self) -> i32 {
        self.lock().expected_exit_code
    }

    #[must_use]
    pub fn ignores_exit_code(&self) -> bool {
        self.lock().ignore_exit_code
    }

    /// Stdout lines without terminators.
    #[must_use]
    pub fn stdout_lines(&self) -> Arc<Vec<String>> {
        self.lines(EventKind::Stdout)
    }

    /// Stderr lines without terminators.
    #[must_use]
    pub fn stderr_lines(&self) -> Arc<Vec<String>> {
        self.lines(EventKind::Stderr)
    }

    fn lines(&self, kind: EventKind) -> Arc<Vec<String>> {
        let mut state = self.lock();
        let cached = match kind {
            EventKind::Stderr => state.stderr_memo.clone(),
            _ => state.stdout_memo.clone(),
        };
        if let Some(lines) = cached {
            return lines;
        }

        let lines = Arc::new(lines_of(&state.output, kind));
        // The log only stops growing once finished.
        if state.lifecycle.finished() && lines.len() < MEMO_LINE_LIMIT {
            let slot = match kind {
                EventKind::Stderr => &mut state.stderr_memo,
                _ => &mut state.stdout_memo,
            };
            *slot = Some(Arc::clone(&lines));
        }
        lines
    }

    #[must_use]
    pub fn snapshot(&self) -> SpawnSnapshot {
        let state = self.lock();
        SpawnSnapshot {
            command: state.command.clone(),
            errors: state.errors.iter().map(ToString::to_string).collect(),
            output: state.output.clone(),
            running: state.lifecycle.running(),
            started: state.lifecycle.started(),
            finished: state.lifecycle.finished(),
            timeout_at: state.timeout_at,
            timeout_in: state.timeout_in,
        }
    }

    /// Snapshot as a JSON value, for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self.snapshot())
    }
}

impl Serialize for Spawn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl fmt::Debug for Spawn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Spawn")
            .field("command", &state.command)
            .field("state", &state.lifecycle)
            .field("pid", &state.child.as_ref().and_then(Child::id))
            .field("exit_code", &state.exit_code)
            .field("callbacks", &state.callbacks)
            .finish_non_exhaustive()
    }
}

/// Build a controller from `command` and `options` and run it to completion.
///
/// # Errors
///
/// Returns whichever error ended the run.
pub async fn run<I, S>(command: I, options: SpawnOptions) -> Result<Spawn, SpawnError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let spawn = Spawn::with_options(SpawnOptions {
        command: command.into_iter().map(Into::into).collect(),
        ..options
    })?;
    spawn.run()?.await
}

async fn pump<R>(spawn: Spawn, mut reader: R, kind: EventKind)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_CHUNK];
    let mut pending = Vec::new();
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                for chunk in drain_chunks(&mut pending, false) {
                    spawn.handle_chunk(kind, chunk);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = ?kind, "Failed reading process output");
                break;
            }
        }
    }
    for chunk in drain_chunks(&mut pending, true) {
        spawn.handle_chunk(kind, chunk);
    }
}

/// Split buffered output into chunks: each complete line, then whatever
/// partial text is left. Only an incomplete UTF-8 sequence at the very end
/// is held back, and only until `eof`.
fn drain_chunks(pending: &mut Vec<u8>, eof: bool) -> Vec<String> {
    let mut chunks = Vec::new();
    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = pending.drain(..=pos).collect();
        chunks.push(String::from_utf8_lossy(&line).into_owned());
    }
    if pending.is_empty() {
        return chunks;
    }

    let keep = match std::str::from_utf8(pending) {
        Err(e) if !eof && e.error_len().is_none() => e.valid_up_to(),
        _ => pending.len(),
    };
    if keep > 0 {
        let partial: Vec<u8> = pending.drain(..keep).collect();
        chunks.push(String::from_utf8_lossy(&partial).into_owned());
    }
    chunks
}

/// Send `signal` to the child held in `state`, if it is still unreaped.
fn signal_child(state: &State, signal: Signal) -> Option<nix::Result<()>> {
    if !state.lifecycle.running() {
        return None;
    }
    let pid = state.child.as_ref().and_then(Child::id)?;
    let pid = Pid::from_raw(i32::try_from(pid).ok()?);
    tracing::debug!(pid = %pid, signal = ?signal, "Signalling process");
    Some(nix::sys::signal::kill(pid, signal))
}

fn validate_exit_code(code: i32) -> Result<i32, SpawnError> {
    if code < 0 {
        return Err(SpawnError::invalid_exit_code(code));
    }
    Ok(code)
}

/// Parse an expected exit code given as text.
///
/// # Errors
///
/// Returns `SpawnError::Validation` unless `value` is all ASCII digits and fits an `i32`.
pub fn parse_exit_code(value: &str) -> Result<i32, SpawnError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SpawnError::invalid_exit_code(value));
    }
    value
        .parse()
        .map_err(|_| SpawnError::invalid_exit_code(value))
}

/// Shell-escaped command line for logs.
#[must_use]
pub fn display_command(command: &[String]) -> String {
    command
        .iter()
        .map(|part| shell_escape::escape(Cow::Borrowed(part.as_str())))
        .collect::<Vec<_>>()
        .join(" ")
}
