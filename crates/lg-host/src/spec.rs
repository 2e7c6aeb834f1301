// SPDX-License-Identifier: MIT OR Apache-2.0
//! Launch specification: what to run and where its output goes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// How the log file is opened when a backend is launched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogMode {
    /// Discard any previous contents.
    #[default]
    Truncate,
    /// Keep previous contents and write after them.
    Append,
}

/// Immutable description of a backend process to start.
///
/// The environment overlay is applied to the spawned process only. Entries
/// override ambient variables of the same name; everything else is inherited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Label used in logs and reports.
    pub name: String,
    /// Executable path or command name resolved through `PATH`.
    pub executable: String,
    /// Arguments passed through verbatim.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the backend. Inherits the launcher's when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Variables merged over the ambient environment of the child.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// File receiving both stdout and stderr.
    pub log_path: PathBuf,
    /// Truncate or append to `log_path`.
    #[serde(default)]
    pub log_mode: LogMode,
}

impl LaunchSpec {
    /// Create a spec for `executable` logging to `log_path`, with no args,
    /// no overlay and [`LogMode::Truncate`].
    pub fn new(executable: impl Into<String>, log_path: impl Into<PathBuf>) -> Self {
        let executable = executable.into();
        let name = Path::new(&executable)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| executable.clone());
        Self {
            name,
            executable,
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            log_path: log_path.into(),
            log_mode: LogMode::default(),
        }
    }

    /// Override the label.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Add one overlay variable, replacing an earlier value for the same key.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several overlay variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Choose how the log file is opened.
    pub fn log_mode(mut self, mode: LogMode) -> Self {
        self.log_mode = mode;
        self
    }

    /// The command line as a single display string.
    pub fn command_line(&self) -> String {
        std::iter::once(self.executable.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
