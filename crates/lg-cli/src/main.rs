// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use lg_config::{LauncherConfig, ResolvedBackend, resolve_backend};
use lg_host::probe::{DEFAULT_CHECK_TIMEOUT, DEFAULT_MAX_ATTEMPTS};
use lg_host::{
    CancelToken, LaunchStatus, Liveness, PollOutcome, ReadinessProbe, ServerLauncher,
    poll_readiness,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "launchgate", version, about = "Launch inference backends and wait until they are ready")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend catalogue (defaults to ./launchgate.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List configured backends.
    List,

    /// Validate the catalogue and check that executables can be found.
    Validate,

    /// Wait for an already running server to accept connections.
    Probe {
        /// Host to connect to.
        #[arg(long, default_value = lg_config::DEFAULT_HOST)]
        host: String,

        /// TCP port to probe.
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        port: Option<u16>,

        /// HTTP health URL to probe instead of a bare port.
        #[arg(long)]
        url: Option<String>,

        /// Delay between checks in milliseconds.
        #[arg(long, default_value_t = 2000)]
        interval_ms: u64,

        /// Number of checks before giving up.
        #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
        max_attempts: u32,
    },

    /// Launch backends detached and wait for each to become ready.
    Up {
        /// Backends to launch (all when omitted).
        names: Vec<String>,

        /// Print JSON reports instead of status lines.
        #[arg(long)]
        json: bool,
    },

    /// Print the JSON schema of the catalogue file.
    Schema,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = commands::load(cli.config.as_deref())?;

    let filter = if cli.debug {
        EnvFilter::new("launchgate=debug")
    } else {
        let level = config.log_level.as_deref().unwrap_or("info");
        EnvFilter::new(format!("launchgate={level}"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ok = match cli.command {
        Commands::List => cmd_list(&config),
        Commands::Validate => cmd_validate(&config),
        Commands::Probe {
            host,
            port,
            url,
            interval_ms,
            max_attempts,
        } => cmd_probe(host, port, url, interval_ms, max_attempts).await?,
        Commands::Up { names, json } => cmd_up(&config, &names, json).await?,
        Commands::Schema => {
            println!("{}", commands::schema_json()?);
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn cmd_list(config: &LauncherConfig) -> bool {
    for line in commands::list_lines(config) {
        println!("{line}");
    }
    true
}

fn cmd_validate(config: &LauncherConfig) -> bool {
    let report = commands::validate(config, |key| std::env::var(key).ok());
    for e in &report.errors {
        eprintln!("error: {e}");
    }
    for w in &report.warnings {
        eprintln!("warning: {w}");
    }
    if report.is_ok() {
        println!("ok: {} backend(s)", config.backends.len());
    }
    report.is_ok()
}

async fn cmd_probe(
    host: String,
    port: Option<u16>,
    url: Option<String>,
    interval_ms: u64,
    max_attempts: u32,
) -> Result<bool> {
    let probe = match (url, port) {
        (Some(url), _) => ReadinessProbe::http(url),
        (None, Some(port)) => ReadinessProbe::tcp(host, port),
        (None, None) => anyhow::bail!("either --port or --url is required"),
    }
    .interval(Duration::from_millis(interval_ms))
    .max_attempts(max_attempts)
    .check_timeout(DEFAULT_CHECK_TIMEOUT);

    let check = probe.checker().context("build readiness check")?;
    let cancel = cancel_on_ctrl_c();
    let outcome = poll_readiness(&probe, check.as_ref(), || Liveness::Running, Some(&cancel)).await;

    let signal = &probe.signal;
    Ok(match outcome {
        PollOutcome::Ready { attempts } => {
            println!("ready {signal} after {attempts} check(s)");
            true
        }
        PollOutcome::TimedOut {
            attempts,
            last_error,
        } => {
            let last = last_error.unwrap_or_else(|| "no checks made".into());
            println!("timed_out {signal} after {attempts} check(s): {last}");
            false
        }
        PollOutcome::Cancelled { attempts } => {
            println!("cancelled {signal} after {attempts} check(s)");
            false
        }
        PollOutcome::Exited { .. } => false,
    })
}

async fn cmd_up(config: &LauncherConfig, names: &[String], json: bool) -> Result<bool> {
    commands::ensure_valid(config)?;
    let selected = commands::select_backends(config, names)?;

    let mut plans = Vec::with_capacity(selected.len());
    for name in &selected {
        let resolved = resolve_backend(config, name, |key| std::env::var(key).ok())
            .with_context(|| format!("resolve backend '{name}'"))?;
        if let Some(dir) = resolved
            .spec
            .log_path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log directory '{}'", dir.display()))?;
        }
        plans.push(resolved);
    }

    info!(target: "launchgate.cli", backends = ?selected, "launching");
    let launcher = ServerLauncher::new();
    let cancel = cancel_on_ctrl_c();
    let results = join_all(plans.into_iter().map(|ResolvedBackend { spec, probe }| {
        let cancel = cancel.clone();
        async move {
            let name = spec.name.clone();
            let mut handle = match launcher.launch(spec) {
                Ok(handle) => handle,
                Err(e) => return Err((name, e)),
            };
            launcher
                .await_ready_or_cancel(&mut handle, &probe, &cancel)
                .await;
            Ok(handle)
        }
    }))
    .await;

    // Dropping a handle never kills its backend.
    let mut all_ready = true;
    let mut reports = Vec::new();
    for result in results {
        match result {
            Ok(handle) => {
                let report = handle.report();
                all_ready &= report.status == LaunchStatus::Ready;
                if !json {
                    println!("{}", commands::status_line(&report));
                }
                reports.push(serde_json::to_value(&report)?);
            }
            Err((name, e)) => {
                all_ready = false;
                if !json {
                    println!("{name}: spawn_failed ({e})");
                }
                reports.push(serde_json::json!({
                    "name": name,
                    "status": "spawn_failed",
                    "error": e.to_string(),
                }));
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Ok(all_ready)
}

fn cancel_on_ctrl_c() -> CancelToken {
    let token = CancelToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn up_accepts_names_and_json() {
        let cli = Cli::try_parse_from(["launchgate", "up", "vllm", "tgi", "--json"]).unwrap();
        match cli.command {
            Commands::Up { names, json } => {
                assert_eq!(names, vec!["vllm", "tgi"]);
                assert!(json);
            }
            other => panic!("expected Up, got {other:?}"),
        }
    }

    #[test]
    fn probe_defaults_match_library() {
        let cli = Cli::try_parse_from(["launchgate", "probe", "--port", "12000"]).unwrap();
        match cli.command {
            Commands::Probe {
                host,
                port,
                interval_ms,
                max_attempts,
                ..
            } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(port, Some(12000));
                assert_eq!(interval_ms, 2000);
                assert_eq!(max_attempts, 150);
            }
            other => panic!("expected Probe, got {other:?}"),
        }
    }

    #[test]
    fn probe_needs_port_or_url() {
        assert!(Cli::try_parse_from(["launchgate", "probe"]).is_err());
        assert!(
            Cli::try_parse_from([
                "launchgate",
                "probe",
                "--port",
                "1",
                "--url",
                "http://x/health"
            ])
            .is_err()
        );
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["launchgate", "list", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }
}
