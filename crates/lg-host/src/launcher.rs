// SPDX-License-Identifier: MIT OR Apache-2.0
//! Detached backend spawning and the readiness gate.

use crate::probe::{Liveness, PollOutcome, ReadinessProbe, poll_readiness};
use crate::spec::{LaunchSpec, LogMode};
use crate::{CancelToken, LaunchError, LaunchHandle, LaunchStatus};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::{Child, Command};
use tracing::{debug, info};

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;

/// Starts backend processes and waits for them to become reachable.
///
/// Stateless: every launch is independent, so one launcher can serve any
/// number of backends concurrently. Callers must give concurrent backends
/// distinct ports and log paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerLauncher;

impl ServerLauncher {
    /// Create a launcher.
    pub fn new() -> Self {
        Self
    }

    /// Spawn the backend described by `spec` and return immediately.
    ///
    /// The child gets its own process group, a null stdin, and both output
    /// streams redirected into `spec.log_path`. The overlay in `spec.env` is
    /// applied to the child only. Must be called within a tokio runtime.
    ///
    /// On Unix the new process group shields the backend from Ctrl-C and
    /// job-control signals aimed at the launcher's group. It stays in the
    /// launcher's session, so a hangup sent to the whole session when the
    /// controlling terminal closes still reaches it. Run under `setsid` or
    /// `nohup` when the backend must outlive the terminal.
    pub fn launch(&self, spec: LaunchSpec) -> Result<LaunchHandle, LaunchError> {
        if let Some(dir) = &spec.cwd {
            if !dir.is_dir() {
                return Err(LaunchError::WorkingDir { path: dir.clone() });
            }
        }

        let stdout = open_log(&spec.log_path, spec.log_mode)?;
        let stderr = stdout.try_clone().map_err(|source| LaunchError::LogFile {
            path: spec.log_path.clone(),
            source,
        })?;

        let mut cmd = Command::new(&spec.executable);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(false);

        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | DETACHED_PROCESS);

        let child = spawn(cmd, &spec)?;
        let pid = child.id().ok_or_else(|| LaunchError::MissingPid {
            command: spec.executable.clone(),
        })?;

        info!(
            target: "launchgate.launch",
            backend = %spec.name,
            pid,
            command = %spec.command_line(),
            log = %spec.log_path.display(),
            overlay_vars = spec.env.len(),
            "backend spawned"
        );

        Ok(LaunchHandle::new(spec, pid, child))
    }

    /// Poll `probe` until the backend is reachable, exits, or the budget is
    /// spent, and record the terminal status on `handle`.
    ///
    /// Returns at the first successful check. On timeout the backend is left
    /// running. Dropping this future (for instance under
    /// `tokio::time::timeout`) leaves the handle in `Starting` and the
    /// backend untouched. A handle that is already settled is returned as is.
    pub async fn await_ready(
        &self,
        handle: &mut LaunchHandle,
        probe: &ReadinessProbe,
    ) -> LaunchStatus {
        self.wait(handle, probe, None).await
    }

    /// Like [`await_ready`](Self::await_ready), but stops early when `cancel`
    /// fires. A cancelled wait keeps the handle in `Starting`.
    pub async fn await_ready_or_cancel(
        &self,
        handle: &mut LaunchHandle,
        probe: &ReadinessProbe,
        cancel: &CancelToken,
    ) -> LaunchStatus {
        self.wait(handle, probe, Some(cancel)).await
    }

    /// Launch `spec` and wait for it with `probe`.
    pub async fn launch_and_wait(
        &self,
        spec: LaunchSpec,
        probe: &ReadinessProbe,
    ) -> Result<LaunchHandle, LaunchError> {
        let mut handle = self.launch(spec)?;
        self.await_ready(&mut handle, probe).await;
        Ok(handle)
    }

    async fn wait(
        &self,
        handle: &mut LaunchHandle,
        probe: &ReadinessProbe,
        cancel: Option<&CancelToken>,
    ) -> LaunchStatus {
        if handle.status().is_terminal() {
            return handle.status();
        }

        let started = Instant::now();
        let check = match probe.checker() {
            Ok(check) => check,
            Err(e) => {
                // Settles as TimedOut; the backend keeps running.
                let outcome = PollOutcome::TimedOut {
                    attempts: 0,
                    last_error: Some(format!("readiness check unavailable: {e}")),
                };
                return handle.settle(outcome, started.elapsed());
            }
        };

        debug!(
            target: "launchgate.probe",
            backend = %handle.spec().name,
            pid = handle.pid(),
            signal = %probe.signal,
            interval_ms = probe.interval.as_millis() as u64,
            max_attempts = probe.max_attempts,
            "waiting for backend readiness"
        );

        let child = handle.child_mut();
        let outcome = poll_readiness(probe, check.as_ref(), || liveness(child), cancel).await;
        handle.settle(outcome, started.elapsed())
    }
}

fn liveness(child: &mut Child) -> Liveness {
    match child.try_wait() {
        Ok(Some(status)) => Liveness::Exited(status.code()),
        Ok(None) => Liveness::Running,
        // Cannot tell; let the readiness check decide.
        Err(_) => Liveness::Running,
    }
}

fn open_log(path: &Path, mode: LogMode) -> Result<File, LaunchError> {
    let mut opts = OpenOptions::new();
    opts.create(true);
    match mode {
        LogMode::Truncate => opts.write(true).truncate(true),
        LogMode::Append => opts.append(true),
    };
    opts.open(path).map_err(|source| LaunchError::LogFile {
        path: path.to_path_buf(),
        source,
    })
}

fn spawn(mut cmd: Command, spec: &LaunchSpec) -> Result<Child, LaunchError> {
    cmd.spawn().map_err(|source| match source.kind() {
        ErrorKind::NotFound => LaunchError::ExecutableNotFound {
            command: spec.executable.clone(),
        },
        _ => LaunchError::Spawn {
            command: spec.executable.clone(),
            source,
        },
    })
    // `cmd` drops here, closing the parent's copies of the log descriptors.
}
