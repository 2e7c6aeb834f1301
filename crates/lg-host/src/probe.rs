// SPDX-License-Identifier: MIT OR Apache-2.0
//! Readiness probing: the signal to test, how often, and for how long.
//!
//! The poll loop is a bounded, fixed-interval loop. Each attempt sleeps for
//! the interval, checks that the backend process is still alive, then tests
//! the readiness signal. Probe errors never end the loop early; they only
//! mean "not ready yet".

use crate::CancelToken;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Default delay between readiness checks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Default number of readiness checks (300 s at the default interval).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 150;

/// Default timeout applied to a single readiness check.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// The observable condition taken as proof that a backend is usable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadinessSignal {
    /// A TCP port accepting connections.
    Tcp {
        /// Host to connect to.
        host: String,
        /// Port to connect to.
        port: u16,
    },
    /// An HTTP endpoint answering with a 2xx status.
    Http {
        /// Full URL, e.g. `http://127.0.0.1:12000/health`.
        url: String,
    },
}

impl fmt::Display for ReadinessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Self::Http { url } => f.write_str(url),
        }
    }
}

/// Polling configuration used to detect when a backend is reachable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessProbe {
    /// What to test.
    pub signal: ReadinessSignal,
    /// Delay before each check.
    #[serde(rename = "interval_ms", with = "crate::duration_millis")]
    pub interval: Duration,
    /// Number of checks before giving up.
    pub max_attempts: u32,
    /// Upper bound on a single check.
    #[serde(rename = "check_timeout_ms", with = "crate::duration_millis")]
    pub check_timeout: Duration,
}

impl ReadinessProbe {
    /// Probe a TCP port with the default interval and attempt budget.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::with_signal(ReadinessSignal::Tcp {
            host: host.into(),
            port,
        })
    }

    /// Probe an HTTP health URL with the default interval and attempt budget.
    pub fn http(url: impl Into<String>) -> Self {
        Self::with_signal(ReadinessSignal::Http { url: url.into() })
    }

    fn with_signal(signal: ReadinessSignal) -> Self {
        Self {
            signal,
            interval: DEFAULT_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }

    /// Set the delay between checks.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the number of checks.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the per-check timeout.
    pub fn check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// Total sleep budget: `interval × max_attempts`.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }

    /// Build the check matching this probe's signal.
    pub fn checker(&self) -> Result<Box<dyn ReadinessCheck>, reqwest::Error> {
        Ok(match &self.signal {
            ReadinessSignal::Tcp { host, port } => Box::new(TcpCheck {
                host: host.clone(),
                port: *port,
                timeout: self.check_timeout,
            }),
            ReadinessSignal::Http { url } => Box::new(HttpCheck::new(url, self.check_timeout)?),
        })
    }
}

// ── Checks ──────────────────────────────────────────────────────────

/// Result of a single readiness check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The signal was observed.
    Reachable,
    /// Not reachable yet; carries the probe error for diagnostics.
    NotReady(String),
}

/// A single reachability test.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// Run the check once.
    async fn check(&self) -> ProbeOutcome;
}

/// TCP connect-and-close check.
#[derive(Clone, Debug)]
pub struct TcpCheck {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpCheck {
    /// Create a check against `host:port`.
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }
}

#[async_trait]
impl ReadinessCheck for TcpCheck {
    async fn check(&self) -> ProbeOutcome {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_stream)) => ProbeOutcome::Reachable,
            Ok(Err(e)) => ProbeOutcome::NotReady(e.to_string()),
            Err(_) => ProbeOutcome::NotReady(format!(
                "connect timed out after {}ms",
                self.timeout.as_millis()
            )),
        }
    }
}

/// HTTP GET check; any 2xx response counts as ready.
///
/// Requests go straight to the backend. Proxy settings from the environment
/// (`HTTP_PROXY`, `http_proxy`, `ALL_PROXY`) are ignored.
#[derive(Clone, Debug)]
pub struct HttpCheck {
    url: String,
    client: reqwest::Client,
}

impl HttpCheck {
    /// Create a check against `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl ReadinessCheck for HttpCheck {
    async fn check(&self) -> ProbeOutcome {
        match self.client.get(&self.url).send().await {
            Ok(res) if res.status().is_success() => ProbeOutcome::Reachable,
            Ok(res) => ProbeOutcome::NotReady(format!("health returned {}", res.status())),
            Err(e) => ProbeOutcome::NotReady(e.to_string()),
        }
    }
}

// ── Poll loop ───────────────────────────────────────────────────────

/// Liveness of the probed backend process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    /// Still running.
    Running,
    /// Exited, with its exit code when one is available.
    Exited(Option<i32>),
}

/// How a poll loop ended. `attempts` counts completed checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The check succeeded on attempt `attempts`.
    Ready {
        /// 1-based attempt that succeeded.
        attempts: u32,
    },
    /// Every attempt failed.
    TimedOut {
        /// Always equal to the probe's `max_attempts`.
        attempts: u32,
        /// Error from the final check.
        last_error: Option<String>,
    },
    /// The process exited before the check succeeded.
    Exited {
        /// Attempt during which the exit was observed.
        attempts: u32,
        /// Exit code, if any.
        code: Option<i32>,
    },
    /// The wait was cancelled.
    Cancelled {
        /// Checks completed before cancellation.
        attempts: u32,
    },
}

enum Step {
    Reachable,
    NotReady(String),
    Exited(Option<i32>),
}

async fn attempt<C, L>(interval: Duration, check: &C, liveness: &mut L) -> Step
where
    C: ReadinessCheck + ?Sized,
    L: FnMut() -> Liveness,
{
    tokio::time::sleep(interval).await;
    if let Liveness::Exited(code) = liveness() {
        return Step::Exited(code);
    }
    match check.check().await {
        ProbeOutcome::Reachable => Step::Reachable,
        ProbeOutcome::NotReady(reason) => Step::NotReady(reason),
    }
}

/// Poll `check` until it succeeds, the process exits, the budget runs out
/// or `cancel` fires.
///
/// `liveness` is consulted before each check; pass `|| Liveness::Running`
/// when the backend was not started by this process.
pub async fn poll_readiness<C, L>(
    probe: &ReadinessProbe,
    check: &C,
    mut liveness: L,
    cancel: Option<&CancelToken>,
) -> PollOutcome
where
    C: ReadinessCheck + ?Sized,
    L: FnMut() -> Liveness,
{
    let mut last_error = None;

    for n in 1..=probe.max_attempts {
        let step = attempt(probe.interval, check, &mut liveness);
        let step = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => return PollOutcome::Cancelled { attempts: n - 1 },
                step = step => step,
            },
            None => step.await,
        };

        match step {
            Step::Reachable => return PollOutcome::Ready { attempts: n },
            Step::Exited(code) => return PollOutcome::Exited { attempts: n, code },
            Step::NotReady(reason) => {
                debug!(
                    target: "launchgate.probe",
                    attempt = n,
                    max_attempts = probe.max_attempts,
                    signal = %probe.signal,
                    error = %reason,
                    "backend not ready"
                );
                last_error = Some(reason);
            }
        }
    }

    PollOutcome::TimedOut {
        attempts: probe.max_attempts,
        last_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_give_five_minute_budget() {
        let probe = ReadinessProbe::tcp("127.0.0.1", 12000);
        assert_eq!(probe.interval, DEFAULT_INTERVAL);
        assert_eq!(probe.max_attempts, 150);
        assert_eq!(probe.budget(), Duration::from_secs(300));
    }

    #[test]
    fn signal_display() {
        let tcp = ReadinessSignal::Tcp {
            host: "localhost".into(),
            port: 8080,
        };
        assert_eq!(tcp.to_string(), "tcp://localhost:8080");
        let http = ReadinessSignal::Http {
            url: "http://localhost:8080/health".into(),
        };
        assert_eq!(http.to_string(), "http://localhost:8080/health");
    }

    #[test]
    fn probe_serializes_durations_as_millis() {
        let probe = ReadinessProbe::tcp("127.0.0.1", 8080)
            .interval(Duration::from_millis(250))
            .max_attempts(4);
        let json = serde_json::to_value(&probe).unwrap();
        assert_eq!(json["interval_ms"], 250);
        assert_eq!(json["check_timeout_ms"], 1000);
        assert_eq!(json["signal"]["kind"], "tcp");
        let back: ReadinessProbe = serde_json::from_value(json).unwrap();
        assert_eq!(back, probe);
    }

    #[tokio::test]
    async fn tcp_check_sees_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let check = TcpCheck::new("127.0.0.1", port, Duration::from_secs(1));
        assert_eq!(check.check().await, ProbeOutcome::Reachable);
    }

    #[tokio::test]
    async fn tcp_check_reports_refused_as_not_ready() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let check = TcpCheck::new("127.0.0.1", port, Duration::from_secs(1));
        assert!(matches!(check.check().await, ProbeOutcome::NotReady(_)));
    }

    #[tokio::test]
    async fn unresolvable_host_is_not_ready() {
        let check = TcpCheck::new("no-such-host.invalid", 80, Duration::from_millis(500));
        assert!(matches!(check.check().await, ProbeOutcome::NotReady(_)));
    }

    /// Serve every connection on a local port with a bodiless `status` reply.
    async fn serve_status(status: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let mut seen = Vec::new();
                    while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                        match sock.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => seen.extend_from_slice(&buf[..n]),
                        }
                    }
                    let reply = format!(
                        "HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    );
                    let _ = sock.write_all(reply.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        format!("http://127.0.0.1:{port}/health")
    }

    #[tokio::test]
    async fn http_check_ok_is_reachable() {
        let url = serve_status("200 OK").await;
        let check = HttpCheck::new(url, Duration::from_secs(2)).unwrap();
        assert_eq!(check.check().await, ProbeOutcome::Reachable);
    }

    #[tokio::test]
    async fn http_check_503_is_not_ready() {
        let url = serve_status("503 Service Unavailable").await;
        let check = HttpCheck::new(url, Duration::from_secs(2)).unwrap();
        match check.check().await {
            ProbeOutcome::NotReady(reason) => assert!(reason.contains("503"), "{reason}"),
            other => panic!("expected NotReady, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_check_refused_is_not_ready() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{port}/health");
        let check = HttpCheck::new(url, Duration::from_secs(1)).unwrap();
        assert!(matches!(check.check().await, ProbeOutcome::NotReady(_)));
    }

    #[tokio::test]
    async fn http_signal_builds_http_checker() {
        let url = serve_status("204 No Content").await;
        let check = ReadinessProbe::http(url).checker().unwrap();
        assert_eq!(check.check().await, ProbeOutcome::Reachable);
    }
}
