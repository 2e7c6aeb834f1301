// SPDX-License-Identifier: MIT OR Apache-2.0
//! Spawn-time errors. Readiness outcomes are reported through
//! [`LaunchStatus`](crate::LaunchStatus), not through this type.

use std::path::PathBuf;
use thiserror::Error;

/// Failures that prevent a backend from being started at all.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The executable could not be found.
    #[error("executable not found: {command}")]
    ExecutableNotFound {
        /// Command as given in the `LaunchSpec`.
        command: String,
    },

    /// The working directory does not exist or is not a directory.
    #[error("working directory unavailable: {}", path.display())]
    WorkingDir {
        /// Directory from the `LaunchSpec`.
        path: PathBuf,
    },

    /// The log file could not be opened for writing.
    #[error("failed to open log file {}: {source}", path.display())]
    LogFile {
        /// Log path from the `LaunchSpec`.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Any other OS-level spawn failure (permission denied, resource limits).
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        /// Command as given in the `LaunchSpec`.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The child was reaped before its process id could be read.
    #[error("spawned {command} but no process id was available")]
    MissingPid {
        /// Command as given in the `LaunchSpec`.
        command: String,
    },
}
