// SPDX-License-Identifier: MIT OR Apache-2.0
//! Launch status state machine. Status only ever moves forward:
//! `Starting` to exactly one of `Ready`, `TimedOut` or `Failed`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Outcome state of a single launch attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchStatus {
    /// Spawned; readiness not yet established.
    Starting,
    /// The readiness signal was observed.
    Ready,
    /// The probe budget ran out. The backend is still running.
    TimedOut,
    /// The backend exited before it became ready.
    Failed,
}

impl LaunchStatus {
    /// Returns `true` for `Ready`, `TimedOut` and `Failed`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Starting)
    }
}

impl fmt::Display for LaunchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::TimedOut => "timed_out",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Record of a single status transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusTransition {
    /// Status before the transition.
    pub from: LaunchStatus,
    /// Status after the transition.
    pub to: LaunchStatus,
    /// RFC 3339 timestamp of the transition.
    pub timestamp: String,
    /// Optional human-readable reason.
    pub reason: Option<String>,
}

/// Rejected status transitions.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StatusError {
    /// A terminal status was already recorded.
    #[error("launch already settled as {0}")]
    AlreadySettled(LaunchStatus),
    /// Only terminal statuses can be entered.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: LaunchStatus,
        /// Requested status.
        to: LaunchStatus,
    },
}

/// Tracks the status of one launch and enforces monotonic transitions.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    status: LaunchStatus,
    history: Vec<StatusTransition>,
}

impl StatusTracker {
    /// Create a tracker in [`LaunchStatus::Starting`].
    pub fn new() -> Self {
        Self {
            status: LaunchStatus::Starting,
            history: Vec::new(),
        }
    }

    /// Current status.
    pub fn status(&self) -> LaunchStatus {
        self.status
    }

    /// Move from `Starting` to a terminal status.
    pub fn settle(&mut self, to: LaunchStatus, reason: Option<String>) -> Result<(), StatusError> {
        if self.status.is_terminal() {
            return Err(StatusError::AlreadySettled(self.status));
        }
        if !to.is_terminal() {
            return Err(StatusError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        self.history.push(StatusTransition {
            from: self.status,
            to,
            timestamp: chrono::Utc::now().to_rfc3339(),
            reason,
        });
        self.status = to;
        Ok(())
    }

    /// Full transition history (at most one entry).
    pub fn history(&self) -> &[StatusTransition] {
        &self.history
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}
