// SPDX-License-Identifier: MIT OR Apache-2.0
//! Backend catalogue for launchgate.
//!
//! This crate provides [`LauncherConfig`] (named backend definitions plus
//! probe defaults) together with helpers for loading from TOML files,
//! applying environment overrides, merging overlays, validating, and
//! resolving an entry into a [`LaunchSpec`] and [`ReadinessProbe`].
#![deny(unsafe_code)]
#![warn(missing_docs)]

use lg_host::{LaunchSpec, LogMode, ReadinessProbe};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while loading, validating, or resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },

    /// No backend with the given name exists.
    #[error("unknown backend '{name}'")]
    UnknownBackend {
        /// Requested name.
        name: String,
    },

    /// Variables listed in `required_env` are not set.
    #[error("backend '{backend}' requires unset variables: {}", vars.join(", "))]
    MissingEnv {
        /// Backend name.
        backend: String,
        /// Variables that were missing or empty.
        vars: Vec<String>,
    },

    /// The backend's `env_file` could not be read.
    #[error("failed to read env file {path}: {reason}")]
    EnvFile {
        /// Path from the config.
        path: String,
        /// Underlying error detail.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent launching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// A backend's readiness budget is unusually large.
    LargeBudget {
        /// Backend name.
        backend: String,
        /// `interval × max_attempts` in seconds.
        secs: u64,
    },
    /// The catalogue defines no backends.
    NoBackends,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::LargeBudget { backend, secs } => {
                write!(f, "backend '{backend}' waits up to {secs}s for readiness")
            }
            ConfigWarning::NoBackends => f.write_str("no backends defined"),
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level launcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct LauncherConfig {
    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Directory for backend log files without an explicit `log_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Probe settings shared by all backends.
    #[serde(default)]
    pub defaults: ProbeDefaults,

    /// Named backend definitions.
    #[serde(default)]
    pub backends: BTreeMap<String, BackendEntry>,

    /// Directory of the file this config was loaded from. Relative
    /// `log_dir`, `log_file`, `env_file` and `cwd` values resolve against it.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".into()),
            log_dir: None,
            defaults: ProbeDefaults::default(),
            backends: BTreeMap::new(),
            base_dir: None,
        }
    }
}

impl LauncherConfig {
    /// Resolve `path` against [`base_dir`](Self::base_dir) when it is relative.
    pub fn anchor(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Probe settings applied where a backend does not set its own.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ProbeDefaults {
    /// Host probed when a backend gives only a port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Delay between checks in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    /// Number of checks before timing out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Timeout for a single check in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_timeout_ms: Option<u64>,
}

/// Log file open mode.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogModeSetting {
    /// Start each launch with an empty log.
    #[default]
    Truncate,
    /// Keep previous output.
    Append,
}

impl From<LogModeSetting> for LogMode {
    fn from(v: LogModeSetting) -> Self {
        match v {
            LogModeSetting::Truncate => LogMode::Truncate,
            LogModeSetting::Append => LogMode::Append,
        }
    }
}

/// Configuration for a single backend server.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct BackendEntry {
    /// Executable path or command name.
    pub command: String,
    /// Arguments passed through verbatim.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Environment overlay. Wins over `env_file`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// `KEY=VALUE` file merged under `env`. A relative path is taken from the
    /// config file's directory, not the current one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,
    /// Variables that must be set (in the overlay or the ambient environment).
    #[serde(default)]
    pub required_env: Vec<String>,
    /// Log file path. Defaults to `<log_dir>/<name>.log`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    /// Truncate or append.
    #[serde(default)]
    pub log_mode: LogModeSetting,
    /// Readiness signal and budget.
    pub readiness: ReadinessEntry,
}

/// Readiness settings for one backend. Exactly one of `port` and
/// `health_url` must be set.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ReadinessEntry {
    /// Host for the TCP check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Port for the TCP check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// HTTP health URL checked instead of a bare port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_url: Option<String>,
    /// Delay between checks in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    /// Number of checks before timing out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Timeout for a single check in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_timeout_ms: Option<u64>,
}

/// A backend entry turned into launcher inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBackend {
    /// What to run.
    pub spec: LaunchSpec,
    /// How to tell it is up.
    pub probe: ReadinessProbe,
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "launchgate.toml";

/// Log directory used when `log_dir` is unset.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Host probed when neither the backend nor the defaults name one.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Readiness budget above which a warning is produced (one hour).
const LARGE_BUDGET_THRESHOLD_SECS: u64 = 3_600;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`LauncherConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file; relative paths inside it
///   resolve against the file's directory.
/// * If `path` is `None`, returns [`LauncherConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<LauncherConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            let mut config = parse_toml(&content)?;
            config.base_dir = p
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .map(Path::to_path_buf);
            config
        }
        None => LauncherConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`LauncherConfig`].
pub fn parse_toml(content: &str) -> Result<LauncherConfig, ConfigError> {
    toml::from_str::<LauncherConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply overrides from the process environment.
///
/// Recognised variables:
/// - `LAUNCHGATE_LOG_LEVEL`
/// - `LAUNCHGATE_LOG_DIR`
pub fn apply_env_overrides(config: &mut LauncherConfig) {
    apply_env_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides using `lookup` in place of the process environment.
pub fn apply_env_overrides_from<F>(config: &mut LauncherConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("LAUNCHGATE_LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Some(val) = lookup("LAUNCHGATE_LOG_DIR") {
        config.log_dir = Some(val);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (empty commands, missing or zero ports, zero intervals or
/// attempt counts, two backends sharing a port or a log file) are returned
/// as a [`ConfigError::ValidationError`]; soft issues come back as warnings.
pub fn validate_config(config: &LauncherConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(level) = &config.log_level {
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            errors.push(format!("invalid log_level '{level}'"));
        }
    }

    check_probe_numbers(
        "defaults",
        config.defaults.interval_ms,
        config.defaults.max_attempts,
        config.defaults.check_timeout_ms,
        &mut errors,
    );

    let mut ports: BTreeMap<u16, &str> = BTreeMap::new();
    let mut logs: BTreeMap<PathBuf, &str> = BTreeMap::new();

    for (name, backend) in &config.backends {
        if name.trim().is_empty() {
            errors.push("backend name must not be empty".into());
        }
        if backend.command.trim().is_empty() {
            errors.push(format!("backend '{name}': command must not be empty"));
        }

        for key in backend.env.keys() {
            if key.is_empty() || key.contains('=') {
                errors.push(format!("backend '{name}': invalid env key '{key}'"));
            }
        }
        if backend.required_env.iter().any(|v| v.trim().is_empty()) {
            errors.push(format!(
                "backend '{name}': required_env entries must not be empty"
            ));
        }

        let r = &backend.readiness;
        match (r.port, &r.health_url) {
            (None, None) => errors.push(format!(
                "backend '{name}': readiness needs a port or a health_url"
            )),
            (Some(_), Some(_)) => errors.push(format!(
                "backend '{name}': set either readiness.port or readiness.health_url, not both"
            )),
            (Some(0), None) => errors.push(format!("backend '{name}': port must not be 0")),
            (Some(port), None) => {
                if let Some(other) = ports.insert(port, name) {
                    errors.push(format!(
                        "backends '{other}' and '{name}' both use port {port}"
                    ));
                }
            }
            (None, Some(url)) => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    errors.push(format!(
                        "backend '{name}': health_url must start with http:// or https://"
                    ));
                }
            }
        }

        check_probe_numbers(
            &format!("backend '{name}'"),
            r.interval_ms,
            r.max_attempts,
            r.check_timeout_ms,
            &mut errors,
        );

        let log = log_path_for(config, name, backend);
        if let Some(other) = logs.insert(log.clone(), name) {
            errors.push(format!(
                "backends '{other}' and '{name}' both log to {}",
                log.display()
            ));
        }

        let budget = effective_probe_timing(config, r);
        let secs = budget.0.saturating_mul(budget.1).as_secs();
        if secs > LARGE_BUDGET_THRESHOLD_SECS {
            warnings.push(ConfigWarning::LargeBudget {
                backend: name.clone(),
                secs,
            });
        }
    }

    if config.backends.is_empty() {
        warnings.push(ConfigWarning::NoBackends);
    }
    if config.log_dir.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "log_dir".into(),
            hint: format!(
                "backend logs default to {}",
                config.anchor(DEFAULT_LOG_DIR).display()
            ),
        });
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

fn check_probe_numbers(
    scope: &str,
    interval_ms: Option<u64>,
    max_attempts: Option<u32>,
    check_timeout_ms: Option<u64>,
    errors: &mut Vec<String>,
) {
    if interval_ms == Some(0) {
        errors.push(format!("{scope}: interval_ms must be at least 1"));
    }
    if max_attempts == Some(0) {
        errors.push(format!("{scope}: max_attempts must be at least 1"));
    }
    if check_timeout_ms == Some(0) {
        errors.push(format!("{scope}: check_timeout_ms must be at least 1"));
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations.  Values in `overlay` take precedence over `base`.
///
/// Backend maps are combined; on name collisions the overlay entry wins.
pub fn merge_configs(base: LauncherConfig, overlay: LauncherConfig) -> LauncherConfig {
    let mut backends = base.backends;
    backends.extend(overlay.backends);
    LauncherConfig {
        log_level: overlay.log_level.or(base.log_level),
        log_dir: overlay.log_dir.or(base.log_dir),
        defaults: ProbeDefaults {
            host: overlay.defaults.host.or(base.defaults.host),
            interval_ms: overlay.defaults.interval_ms.or(base.defaults.interval_ms),
            max_attempts: overlay.defaults.max_attempts.or(base.defaults.max_attempts),
            check_timeout_ms: overlay
                .defaults
                .check_timeout_ms
                .or(base.defaults.check_timeout_ms),
        },
        backends,
        base_dir: overlay.base_dir.or(base.base_dir),
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Effective log path for a backend.
pub fn log_path_for(config: &LauncherConfig, name: &str, backend: &BackendEntry) -> PathBuf {
    match &backend.log_file {
        Some(file) => config.anchor(file),
        None => config
            .anchor(config.log_dir.as_deref().unwrap_or(DEFAULT_LOG_DIR))
            .join(format!("{name}.log")),
    }
}

fn effective_probe_timing(config: &LauncherConfig, r: &ReadinessEntry) -> (Duration, u32) {
    let interval = r
        .interval_ms
        .or(config.defaults.interval_ms)
        .map(Duration::from_millis)
        .unwrap_or(lg_host::probe::DEFAULT_INTERVAL);
    let attempts = r
        .max_attempts
        .or(config.defaults.max_attempts)
        .unwrap_or(lg_host::probe::DEFAULT_MAX_ATTEMPTS);
    (interval, attempts)
}

/// Turn the backend `name` into a [`LaunchSpec`] and [`ReadinessProbe`].
///
/// The overlay is `env_file` (if any) with `env` on top. Every name in
/// `required_env` must be non-empty in the overlay or in `ambient`; only
/// presence is checked. `ambient` stands in for the process environment and
/// is never written to.
pub fn resolve_backend<F>(
    config: &LauncherConfig,
    name: &str,
    ambient: F,
) -> Result<ResolvedBackend, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let backend = config
        .backends
        .get(name)
        .ok_or_else(|| ConfigError::UnknownBackend {
            name: name.to_string(),
        })?;

    let mut env = match &backend.env_file {
        Some(path) => read_env_file(&config.anchor(path))?,
        None => BTreeMap::new(),
    };
    env.extend(backend.env.clone());

    let missing: BTreeSet<String> = backend
        .required_env
        .iter()
        .filter(|var| {
            let set = env.get(var.as_str()).cloned().or_else(|| ambient(var));
            set.is_none_or(|v| v.is_empty())
        })
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::MissingEnv {
            backend: name.to_string(),
            vars: missing.into_iter().collect(),
        });
    }

    let mut spec = LaunchSpec::new(&backend.command, log_path_for(config, name, backend))
        .name(name)
        .args(backend.args.iter().cloned())
        .envs(env)
        .log_mode(backend.log_mode.into());
    if let Some(cwd) = &backend.cwd {
        spec = spec.cwd(config.anchor(cwd));
    }

    Ok(ResolvedBackend {
        spec,
        probe: probe_for(config, &backend.readiness)?,
    })
}

fn probe_for(config: &LauncherConfig, r: &ReadinessEntry) -> Result<ReadinessProbe, ConfigError> {
    let base = match (r.port, &r.health_url) {
        (_, Some(url)) => ReadinessProbe::http(url),
        (Some(port), None) => {
            let host = r
                .host
                .clone()
                .or_else(|| config.defaults.host.clone())
                .unwrap_or_else(|| DEFAULT_HOST.to_string());
            ReadinessProbe::tcp(host, port)
        }
        (None, None) => {
            return Err(ConfigError::ValidationError {
                reasons: vec!["readiness needs a port or a health_url".into()],
            });
        }
    };

    let (interval, attempts) = effective_probe_timing(config, r);
    let mut probe = base.interval(interval).max_attempts(attempts);
    if let Some(ms) = r.check_timeout_ms.or(config.defaults.check_timeout_ms) {
        probe = probe.check_timeout(Duration::from_millis(ms));
    }
    Ok(probe)
}

fn read_env_file(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let env_err = |reason: String| ConfigError::EnvFile {
        path: path.display().to_string(),
        reason,
    };
    let iter = dotenv::from_path_iter(path).map_err(|e| env_err(e.to_string()))?;
    iter.map(|item| item.map_err(|e| env_err(e.to_string())))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
