// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for [`StatusTracker`] and [`ReadinessProbe`] budgets.

use lg_host::{LaunchStatus, ReadinessProbe, StatusError, StatusTracker};
use proptest::prelude::*;
use std::time::Duration;

// ── Strategies ──────────────────────────────────────────────────────

fn arb_status() -> impl Strategy<Value = LaunchStatus> {
    prop_oneof![
        Just(LaunchStatus::Starting),
        Just(LaunchStatus::Ready),
        Just(LaunchStatus::TimedOut),
        Just(LaunchStatus::Failed),
    ]
}

// ── Monotonic status ────────────────────────────────────────────────

proptest! {
    /// Whatever is attempted, the first terminal target sticks.
    #[test]
    fn first_terminal_settle_wins(targets in prop::collection::vec(arb_status(), 0..12)) {
        let mut tracker = StatusTracker::new();
        for to in &targets {
            let _ = tracker.settle(*to, None);
        }

        let expected = targets
            .iter()
            .copied()
            .find(|s| s.is_terminal())
            .unwrap_or(LaunchStatus::Starting);
        prop_assert_eq!(tracker.status(), expected);
        prop_assert!(tracker.history().len() <= 1);
    }

    /// Once terminal, every further settle is rejected.
    #[test]
    fn settled_tracker_rejects_everything(first in arb_status(), next in arb_status()) {
        prop_assume!(first.is_terminal());
        let mut tracker = StatusTracker::new();
        tracker.settle(first, Some("first".into())).unwrap();

        let err = tracker.settle(next, None).unwrap_err();
        prop_assert_eq!(err, StatusError::AlreadySettled(first));
        prop_assert_eq!(tracker.status(), first);
    }
}

// ── Budget arithmetic ───────────────────────────────────────────────

proptest! {
    /// The budget is exactly interval × max_attempts.
    #[test]
    fn budget_is_interval_times_attempts(interval_ms in 1u64..10_000, attempts in 0u32..1_000) {
        let probe = ReadinessProbe::tcp("127.0.0.1", 8080)
            .interval(Duration::from_millis(interval_ms))
            .max_attempts(attempts);
        prop_assert_eq!(
            probe.budget(),
            Duration::from_millis(interval_ms * u64::from(attempts))
        );
    }
}
