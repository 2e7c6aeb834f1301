// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timing properties of the readiness poll loop, driven on a paused clock.

use async_trait::async_trait;
use lg_host::{
    CancelToken, Liveness, PollOutcome, ProbeOutcome, ReadinessCheck, ReadinessProbe,
    poll_readiness,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Succeeds from the `succeed_on`-th call onwards (1-based), never if `None`.
struct ScriptedCheck {
    succeed_on: Option<u32>,
    calls: AtomicU32,
}

impl ScriptedCheck {
    fn succeeding_on(n: u32) -> Self {
        Self {
            succeed_on: Some(n),
            calls: AtomicU32::new(0),
        }
    }

    fn never() -> Self {
        Self {
            succeed_on: None,
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadinessCheck for ScriptedCheck {
    async fn check(&self) -> ProbeOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.succeed_on {
            Some(k) if n >= k => ProbeOutcome::Reachable,
            _ => ProbeOutcome::NotReady("connection refused".into()),
        }
    }
}

fn probe(interval_secs: u64, max_attempts: u32) -> ReadinessProbe {
    ReadinessProbe::tcp("127.0.0.1", 8080)
        .interval(Duration::from_secs(interval_secs))
        .max_attempts(max_attempts)
}

fn running() -> Liveness {
    Liveness::Running
}

// ── Short-circuit ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn ready_on_fourth_check_of_150_takes_eight_seconds() {
    let check = ScriptedCheck::succeeding_on(4);
    let start = Instant::now();

    let outcome = poll_readiness(&probe(2, 150), &check, running, None).await;

    assert_eq!(outcome, PollOutcome::Ready { attempts: 4 });
    assert_eq!(check.calls(), 4);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(8), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(10), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn ready_on_first_check_waits_one_interval() {
    let check = ScriptedCheck::succeeding_on(1);
    let start = Instant::now();

    let outcome = poll_readiness(&probe(2, 150), &check, running, None).await;

    assert_eq!(outcome, PollOutcome::Ready { attempts: 1 });
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn success_on_last_attempt_is_still_ready() {
    let check = ScriptedCheck::succeeding_on(5);
    let outcome = poll_readiness(&probe(2, 5), &check, running, None).await;
    assert_eq!(outcome, PollOutcome::Ready { attempts: 5 });
}

// ── Timeout ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn never_ready_times_out_after_exactly_max_attempts() {
    let check = ScriptedCheck::never();
    let start = Instant::now();

    let outcome = poll_readiness(&probe(2, 5), &check, running, None).await;

    match outcome {
        PollOutcome::TimedOut {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 5);
            assert_eq!(last_error.as_deref(), Some("connection refused"));
        }
        other => panic!("expected TimedOut, got {other:?}"),
    }
    assert_eq!(check.calls(), 5);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(10), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(12), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn full_budget_is_five_minutes() {
    let check = ScriptedCheck::never();
    let start = Instant::now();

    let outcome = poll_readiness(&probe(2, 150), &check, running, None).await;

    assert!(matches!(outcome, PollOutcome::TimedOut { attempts: 150, .. }));
    assert_eq!(check.calls(), 150);
    assert!(start.elapsed() >= Duration::from_secs(300));
}

#[tokio::test(start_paused = true)]
async fn zero_attempts_times_out_immediately() {
    let check = ScriptedCheck::succeeding_on(1);
    let outcome = poll_readiness(&probe(2, 0), &check, running, None).await;
    assert_eq!(
        outcome,
        PollOutcome::TimedOut {
            attempts: 0,
            last_error: None
        }
    );
    assert_eq!(check.calls(), 0);
}

// ── Early exit ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn exit_is_detected_before_budget_runs_out() {
    let check = ScriptedCheck::never();
    let mut polls = 0;
    let liveness = move || {
        polls += 1;
        if polls >= 3 {
            Liveness::Exited(Some(1))
        } else {
            Liveness::Running
        }
    };
    let start = Instant::now();

    let outcome = poll_readiness(&probe(2, 150), &check, liveness, None).await;

    assert_eq!(
        outcome,
        PollOutcome::Exited {
            attempts: 3,
            code: Some(1)
        }
    );
    // The check is skipped once the process is gone.
    assert_eq!(check.calls(), 2);
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn exit_wins_over_an_open_port() {
    let check = ScriptedCheck::succeeding_on(1);
    let outcome =
        poll_readiness(&probe(2, 150), &check, || Liveness::Exited(None), None).await;
    assert_eq!(
        outcome,
        PollOutcome::Exited {
            attempts: 1,
            code: None
        }
    );
}

// ── Cancellation ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn cancel_stops_between_checks() {
    let check = ScriptedCheck::never();
    let token = CancelToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        canceller.cancel();
    });

    let outcome = poll_readiness(&probe(2, 150), &check, running, Some(&token)).await;

    assert_eq!(outcome, PollOutcome::Cancelled { attempts: 2 });
    assert_eq!(check.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn pre_cancelled_token_checks_nothing() {
    let check = ScriptedCheck::succeeding_on(1);
    let token = CancelToken::new();
    token.cancel();

    let outcome = poll_readiness(&probe(2, 150), &check, running, Some(&token)).await;

    assert_eq!(outcome, PollOutcome::Cancelled { attempts: 0 });
    assert_eq!(check.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn caller_timeout_drops_the_wait() {
    let check = ScriptedCheck::never();
    let res = tokio::time::timeout(
        Duration::from_secs(7),
        poll_readiness(&probe(2, 150), &check, running, None),
    )
    .await;
    assert!(res.is_err());
    assert_eq!(check.calls(), 3);
}
