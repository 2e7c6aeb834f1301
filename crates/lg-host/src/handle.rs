// SPDX-License-Identifier: MIT OR Apache-2.0
//! Handle to one launched backend and the outcome of its readiness wait.

use crate::probe::PollOutcome;
use crate::spec::LaunchSpec;
use crate::status::{LaunchStatus, StatusTracker, StatusTransition};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;
use tracing::{error, info, warn};

/// Details attached to a launch once its readiness wait ends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Human-readable summary.
    pub reason: String,
    /// Where the backend's output went.
    pub log_path: PathBuf,
    /// Readiness checks performed.
    pub attempts: u32,
    /// Wall-clock time spent waiting.
    #[serde(rename = "elapsed_ms", with = "crate::duration_millis")]
    pub elapsed: Duration,
    /// Exit code when the backend exited early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Serializable snapshot of a [`LaunchHandle`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LaunchReport {
    /// Backend label.
    pub name: String,
    /// Backend process id.
    pub pid: u32,
    /// Current status.
    pub status: LaunchStatus,
    /// Command line that was launched.
    pub command: String,
    /// Log file path.
    pub log_path: PathBuf,
    /// Diagnostic, once the wait has ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}

/// A launched backend.
///
/// The backend keeps running when the handle is dropped. Stopping it is the
/// caller's decision, via [`terminate`](LaunchHandle::terminate).
#[derive(Debug)]
pub struct LaunchHandle {
    spec: LaunchSpec,
    pid: u32,
    child: Child,
    tracker: StatusTracker,
    diagnostic: Option<Diagnostic>,
}

impl LaunchHandle {
    pub(crate) fn new(spec: LaunchSpec, pid: u32, child: Child) -> Self {
        Self {
            spec,
            pid,
            child,
            tracker: StatusTracker::new(),
            diagnostic: None,
        }
    }

    /// Backend process id, captured right after spawn.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The spec this handle was launched from.
    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    /// Current status.
    pub fn status(&self) -> LaunchStatus {
        self.tracker.status()
    }

    /// Diagnostic for the most recent readiness wait.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        self.diagnostic.as_ref()
    }

    /// Status transitions recorded so far.
    pub fn history(&self) -> &[StatusTransition] {
        self.tracker.history()
    }

    /// Returns `true` while the backend process has not exited. Never blocks.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill the backend and reap it. Returns the exit code when one exists.
    pub async fn terminate(&mut self) -> std::io::Result<Option<i32>> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status.code());
        }
        info!(target: "launchgate.launch", backend = %self.spec.name, pid = self.pid, "terminating backend");
        self.child.kill().await?;
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    /// Wait for the backend to exit on its own.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Serializable snapshot.
    pub fn report(&self) -> LaunchReport {
        LaunchReport {
            name: self.spec.name.clone(),
            pid: self.pid,
            status: self.status(),
            command: self.spec.command_line(),
            log_path: self.spec.log_path.clone(),
            diagnostic: self.diagnostic.clone(),
        }
    }

    pub(crate) fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Record the outcome of a poll loop.
    pub(crate) fn settle(&mut self, outcome: PollOutcome, elapsed: Duration) -> LaunchStatus {
        let (status, attempts, exit_code, reason) = match outcome {
            PollOutcome::Ready { attempts } => (
                Some(LaunchStatus::Ready),
                attempts,
                None,
                format!("reachable after {attempts} check(s)"),
            ),
            PollOutcome::TimedOut {
                attempts,
                last_error,
            } => (
                Some(LaunchStatus::TimedOut),
                attempts,
                None,
                match last_error {
                    Some(e) => format!("not reachable after {attempts} check(s): {e}"),
                    None => format!("not reachable after {attempts} check(s)"),
                },
            ),
            PollOutcome::Exited { attempts, code } => (
                Some(LaunchStatus::Failed),
                attempts,
                code,
                match code {
                    Some(c) => format!("process exited with code {c} before becoming ready"),
                    None => "process was terminated by a signal before becoming ready".to_string(),
                },
            ),
            PollOutcome::Cancelled { attempts } => {
                (None, attempts, None, format!("wait cancelled after {attempts} check(s)"))
            }
        };

        let diagnostic = Diagnostic {
            reason: reason.clone(),
            log_path: self.spec.log_path.clone(),
            attempts,
            elapsed,
            exit_code,
        };

        if let Some(status) = status {
            if let Err(e) = self.tracker.settle(status, Some(reason.clone())) {
                warn!(target: "launchgate.launch", backend = %self.spec.name, error = %e, "ignoring status change");
            }
        }

        let elapsed_ms = elapsed.as_millis() as u64;
        let log = self.spec.log_path.display();
        match self.status() {
            LaunchStatus::Ready => {
                info!(target: "launchgate.launch", backend = %self.spec.name, pid = self.pid, attempts, elapsed_ms, "backend ready")
            }
            LaunchStatus::TimedOut => {
                warn!(target: "launchgate.launch", backend = %self.spec.name, pid = self.pid, attempts, elapsed_ms, log = %log, "{reason}")
            }
            LaunchStatus::Failed => {
                error!(target: "launchgate.launch", backend = %self.spec.name, pid = self.pid, exit_code = ?exit_code, log = %log, "{reason}")
            }
            LaunchStatus::Starting => {
                info!(target: "launchgate.launch", backend = %self.spec.name, pid = self.pid, attempts, "{reason}")
            }
        }

        self.diagnostic = Some(diagnostic);
        self.status()
    }
}
