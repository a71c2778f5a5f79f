//! Deadline resolution for run timeouts.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// One minute in milliseconds.
pub const MS_MINUTE: u64 = 60_000;
/// One hour in milliseconds.
pub const MS_HOUR: u64 = 3_600_000;
/// One day in milliseconds.
pub const MS_DAY: u64 = 86_400_000;

/// Current wall clock time as epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Pick the operative absolute deadline.
///
/// A relative timeout is converted against `now` and wins over an absolute one.
#[must_use]
pub fn resolve_deadline(timeout_in: Option<u64>, timeout_at: Option<i64>, now: i64) -> Option<i64> {
    match timeout_in {
        Some(ms) => Some(now.saturating_add(i64::try_from(ms).unwrap_or(i64::MAX))),
        None => timeout_at,
    }
}

/// Time left until `deadline`, or `None` once it is at or before `now`.
#[must_use]
pub fn remaining(deadline: i64, now: i64) -> Option<Duration> {
    let left = deadline.saturating_sub(now);
    if left <= 0 {
        return None;
    }
    u64::try_from(left).ok().map(Duration::from_millis)
}

/// One-shot timer that runs `on_fire` after `after` unless cancelled first.
///
/// Must be called from within a tokio runtime.
pub fn arm<F>(after: Duration, cancel: CancellationToken, on_fire: F)
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            () = tokio::time::sleep(after) => on_fire(),
            () = cancel.cancelled() => tracing::trace!("Deadline timer cancelled"),
        }
    });
}
