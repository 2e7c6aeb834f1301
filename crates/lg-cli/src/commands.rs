// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command helpers for the launchgate CLI.
//!
//! These functions do not touch the process or the network so they can be
//! tested without spawning the binary.

use anyhow::{Context, Result};
use lg_config::{ConfigError, DEFAULT_CONFIG_FILE, LauncherConfig, load_config, resolve_backend};
use lg_host::{LaunchReport, LaunchStatus};
use schemars::schema_for;
use std::ffi::OsStr;
use std::path::Path;

/// Load the catalogue from `path`, or from `./launchgate.toml` when present.
pub fn load(path: Option<&Path>) -> Result<LauncherConfig> {
    let default = Path::new(DEFAULT_CONFIG_FILE);
    let path = match path {
        Some(p) => Some(p),
        None if default.is_file() => Some(default),
        None => None,
    };
    load_config(path).context("load config")
}

/// One line per backend: name, command line, and readiness signal.
pub fn list_lines(config: &LauncherConfig) -> Vec<String> {
    config
        .backends
        .iter()
        .map(|(name, b)| {
            let signal = match (&b.readiness.health_url, b.readiness.port) {
                (Some(url), _) => url.clone(),
                (None, Some(port)) => format!("port {port}"),
                (None, None) => "no readiness signal".into(),
            };
            let mut cmd = b.command.clone();
            for arg in &b.args {
                cmd.push(' ');
                cmd.push_str(arg);
            }
            format!("{name}\t{cmd}\t{signal}")
        })
        .collect()
}

/// Result of `validate`: blocking errors and advisory notes.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Problems that would stop `up`.
    pub errors: Vec<String>,
    /// Advisory notes.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// `true` when there are no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate the catalogue, then check that every backend resolves and its
/// executable can be found.
///
/// `ambient` stands in for the process environment.
pub fn validate<F>(config: &LauncherConfig, ambient: F) -> ValidationReport
where
    F: Fn(&str) -> Option<String>,
{
    let mut report = ValidationReport::default();
    match lg_config::validate_config(config) {
        Ok(warnings) => report
            .warnings
            .extend(warnings.iter().map(ToString::to_string)),
        Err(ConfigError::ValidationError { reasons }) => {
            report.errors = reasons;
            return report;
        }
        Err(e) => {
            report.errors.push(e.to_string());
            return report;
        }
    }

    for name in config.backends.keys() {
        let resolved = match resolve_backend(config, name, &ambient) {
            Ok(r) => r,
            Err(e) => {
                report.warnings.push(e.to_string());
                continue;
            }
        };
        // An overlay PATH is what the child will search.
        let search = resolved.spec.env.get("PATH").cloned().or_else(|| ambient("PATH"));
        let exe = &resolved.spec.executable;
        if lg_which::which_in(exe, search.as_deref().map(OsStr::new)).is_none() {
            report
                .warnings
                .push(format!("backend '{name}': executable '{exe}' not found in PATH"));
        }
    }
    report
}

/// Refuse a catalogue with hard validation errors, listing every one.
pub fn ensure_valid(config: &LauncherConfig) -> Result<()> {
    match lg_config::validate_config(config) {
        Ok(_) => Ok(()),
        Err(ConfigError::ValidationError { reasons }) => anyhow::bail!(
            "invalid config, nothing launched:\n  {}",
            reasons.join("\n  ")
        ),
        Err(e) => Err(e.into()),
    }
}

/// Pick the backends to start: all of them when `names` is empty.
pub fn select_backends(config: &LauncherConfig, names: &[String]) -> Result<Vec<String>> {
    if names.is_empty() {
        anyhow::ensure!(!config.backends.is_empty(), "no backends defined");
        return Ok(config.backends.keys().cloned().collect());
    }
    for name in names {
        if !config.backends.contains_key(name) {
            return Err(ConfigError::UnknownBackend { name: name.clone() }.into());
        }
    }
    Ok(names.to_vec())
}

/// Human-readable outcome line for one launch.
pub fn status_line(report: &LaunchReport) -> String {
    let name = &report.name;
    let pid = report.pid;
    let log = report.log_path.display();
    let reason = report
        .diagnostic
        .as_ref()
        .map(|d| d.reason.as_str())
        .unwrap_or_default();
    match report.status {
        LaunchStatus::Ready => format!("{name}: ready pid={pid}"),
        LaunchStatus::TimedOut => format!("{name}: timed_out pid={pid} log={log} ({reason})"),
        LaunchStatus::Failed => {
            let code = report
                .diagnostic
                .as_ref()
                .and_then(|d| d.exit_code)
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            format!("{name}: failed pid={pid} exit={code} log={log} ({reason})")
        }
        LaunchStatus::Starting => format!("{name}: starting pid={pid} log={log} ({reason})"),
    }
}

/// JSON schema for the catalogue file.
pub fn schema_json() -> Result<String> {
    let value = serde_json::to_value(schema_for!(LauncherConfig))?;
    serde_json::to_string_pretty(&value).context("serialize schema")
}
