//! Process lifecycle state.

use serde::{Deserialize, Serialize};

/// Where a controller is in its single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LifecycleState {
    #[default]
    Created,
    Running,
    Finished,
}

impl LifecycleState {
    /// Move forward to `next`. Returns `false`, leaving the state alone,
    /// when `next` would not be a step forward.
    pub fn advance(&mut self, next: LifecycleState) -> bool {
        if next <= *self {
            tracing::debug!(from = ?self, to = ?next, "Ignoring lifecycle regression");
            return false;
        }
        tracing::debug!(from = ?self, to = ?next, "State transition");
        *self = next;
        true
    }

    #[must_use]
    pub fn started(self) -> bool {
        self != Self::Created
    }

    #[must_use]
    pub fn running(self) -> bool {
        self == Self::Running
    }

    #[must_use]
    pub fn finished(self) -> bool {
        self == Self::Finished
    }
}
