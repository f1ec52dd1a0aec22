//! Bounded retry-with-sleep helper used by every wait loop.
//!
//! The helper knows nothing about what it polls: callers supply an async
//! predicate. Interruption is cooperative and sampled before each attempt.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::interrupt::InterruptFlag;

/// Seconds represented by one poll attempt when deriving attempt budgets
/// from configured timeouts.
pub const POLL_UNIT_SECS: i64 = 2;

/// Default pause between two poll attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Upper bound on the number of attempts a poll loop may make.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PollLimit {
    /// Give up after this many attempts.
    Attempts(u32),
    /// Poll until the condition holds or the run is interrupted.
    Unbounded,
}

impl PollLimit {
    /// Derives an attempt budget from a timeout in seconds.
    #[must_use]
    pub fn from_timeout(timeout_secs: i64) -> Self {
        Self::Attempts(attempts_for_timeout(timeout_secs))
    }

    const fn allows(self, made: u32) -> bool {
        match self {
            Self::Attempts(max) => made < max,
            Self::Unbounded => true,
        }
    }
}

/// Result of a poll loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PollOutcome {
    /// The condition reported true.
    Ready,
    /// The attempt budget ran out.
    TimedOut,
    /// The interruption flag was raised before an attempt.
    Cancelled,
}

/// Converts a timeout into a number of poll attempts, rounding down.
///
/// Zero or negative timeouts yield zero attempts so the wait fails fast.
#[must_use]
pub fn attempts_for_timeout(timeout_secs: i64) -> u32 {
    if timeout_secs <= 0 {
        return 0;
    }
    u32::try_from(timeout_secs.div_euclid(POLL_UNIT_SECS)).unwrap_or(u32::MAX)
}

/// Invokes `condition` until it reports true, the limit is exhausted, or the
/// interruption flag is raised.
///
/// The flag is checked before every attempt; a raised flag returns
/// [`PollOutcome::Cancelled`] without consuming an attempt or sleeping.
/// `interval` is slept only between attempts.
///
/// # Errors
///
/// Returns the first error produced by `condition`, unchanged.
pub async fn poll_until<F, Fut, E>(
    mut condition: F,
    limit: PollLimit,
    interval: Duration,
    interrupt: &InterruptFlag,
) -> Result<PollOutcome, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let mut made: u32 = 0;
    loop {
        if interrupt.is_set() {
            return Ok(PollOutcome::Cancelled);
        }
        if !limit.allows(made) {
            return Ok(PollOutcome::TimedOut);
        }

        made = made.saturating_add(1);
        if condition().await? {
            return Ok(PollOutcome::Ready);
        }

        if limit.allows(made) {
            sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use rstest::rstest;

    use super::*;

    const FAST: Duration = Duration::from_millis(1);

    fn counting(
        calls: &Arc<AtomicU32>,
        ready_on: u32,
    ) -> impl FnMut() -> std::future::Ready<Result<bool, String>> {
        let calls = Arc::clone(calls);
        move || {
            let made = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(Ok(made >= ready_on))
        }
    }

    #[rstest]
    #[case(4, 2)]
    #[case(5, 2)]
    #[case(20, 10)]
    #[case(1, 0)]
    #[case(0, 0)]
    #[case(-6, 0)]
    fn attempts_round_down(#[case] timeout: i64, #[case] expected: u32) {
        assert_eq!(attempts_for_timeout(timeout), expected);
    }

    #[tokio::test]
    async fn returns_ready_on_first_true_condition() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome = poll_until(
            counting(&calls, 1),
            PollLimit::Attempts(5),
            FAST,
            &InterruptFlag::new(),
        )
        .await;

        assert_eq!(outcome, Ok(PollOutcome::Ready));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_of_four_makes_exactly_two_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome = poll_until(
            counting(&calls, u32::MAX),
            PollLimit::from_timeout(4),
            FAST,
            &InterruptFlag::new(),
        )
        .await;

        assert_eq!(outcome, Ok(PollOutcome::TimedOut));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_timeout_fails_fast_without_polling() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome = poll_until(
            counting(&calls, 1),
            PollLimit::from_timeout(0),
            FAST,
            &InterruptFlag::new(),
        )
        .await;

        assert_eq!(outcome, Ok(PollOutcome::TimedOut));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn raised_flag_cancels_before_any_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let flag = InterruptFlag::new();
        flag.set();

        let outcome = poll_until(counting(&calls, 1), PollLimit::Attempts(3), FAST, &flag).await;

        assert_eq!(outcome, Ok(PollOutcome::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unbounded_poll_stops_when_interrupted() {
        let flag = InterruptFlag::new();
        let trigger = flag.clone();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let outcome = poll_until(
            move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                    trigger.set();
                }
                std::future::ready(Ok::<bool, String>(false))
            },
            PollLimit::Unbounded,
            FAST,
            &flag,
        )
        .await;

        assert_eq!(outcome, Ok(PollOutcome::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn condition_errors_propagate() {
        let outcome = poll_until(
            || std::future::ready(Err::<bool, _>(String::from("boom"))),
            PollLimit::Attempts(3),
            FAST,
            &InterruptFlag::new(),
        )
        .await;

        assert_eq!(outcome, Err(String::from("boom")));
    }
}
