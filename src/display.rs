//! Colored CLI display utilities for spawned process output.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use owo_colors::OwoColorize;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length for the command line in the start banner.
const DEFAULT_MAX_LEN: usize = 80;

/// Truncate a string to a maximum number of characters, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

/// Print the run banner.
pub fn print_run_start(command: &str, timeout_ms: Option<u64>) {
    let timeout = timeout_ms.map_or(String::new(), |ms| format!("timeout={ms}ms"));
    eprintln!(
        "{} {} {} {}",
        timestamp().dimmed(),
        "[RUN]".blue().bold(),
        truncate(command, DEFAULT_MAX_LEN).bold(),
        timeout.dimmed()
    );
}

/// Print one stdout chunk as-is.
///
/// # Errors
///
/// Returns the write error, e.g. when stdout is a closed pipe.
pub fn print_stdout(chunk: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    out.write_all(chunk.as_bytes())?;
    out.flush()
}

/// Print one stderr chunk in red.
///
/// # Errors
///
/// Returns the write error, e.g. when stderr is a closed pipe.
pub fn print_stderr(chunk: &str) -> io::Result<()> {
    let mut err = io::stderr().lock();
    write!(err, "{}", chunk.red())?;
    err.flush()
}

/// Wrap a chunk writer so that it stops after its first failure.
///
/// The failure is logged once; later chunks are dropped silently.
pub fn forwarder<W>(stream: &'static str, write: W) -> impl Fn(&str) + Send + Sync + 'static
where
    W: Fn(&str) -> io::Result<()> + Send + Sync + 'static,
{
    let open = AtomicBool::new(true);
    move |chunk: &str| {
        if !open.load(Ordering::Relaxed) {
            return;
        }
        if let Err(e) = write(chunk) {
            open.store(false, Ordering::Relaxed);
            tracing::warn!(stream, error = %e, "Stopped forwarding process output");
        }
    }
}

/// Print the final exit status.
pub fn print_exit(exit_code: Option<i32>, success: bool) {
    let code = exit_code.map_or_else(|| "none".to_string(), |c| c.to_string());
    if success {
        eprintln!(
            "{} {} exit code {}",
            timestamp().dimmed(),
            "[DONE]".green().bold(),
            code
        );
    } else {
        eprintln!(
            "{} {} exit code {}",
            timestamp().dimmed(),
            "[FAIL]".red().bold(),
            code.red()
        );
    }
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}
