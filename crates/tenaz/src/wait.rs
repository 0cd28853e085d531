//! Wait/Retry Policy
//!
//! Bounded cooperative polling for an eventually-consistent DOM. Every wait
//! has an upper bound; a check never runs faster than the poll
//! interval.
//!
//! Two classes of wait are distinguished:
//!
//! - **Structural**: an element becomes attached/visible (short timeout)
//! - **Data**: asynchronous content populates after navigation or a network
//!   settle (longer timeout plus a fixed settle delay for transitions)
//!
//! Waiting is `tokio::time::sleep`, so a waiting scenario never blocks other
//! scenarios and paused-clock tests run instantly.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default structural timeout (10 seconds)
pub const DEFAULT_STRUCTURAL_TIMEOUT_MS: u64 = 10_000;

/// Default data timeout (20 seconds)
pub const DEFAULT_DATA_TIMEOUT_MS: u64 = 20_000;

/// Default settle delay after a data wait (2 seconds)
pub const DEFAULT_SETTLE_MS: u64 = 2_000;

/// Default polling interval (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Floor for any polling interval; a zero interval would spin
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default cap for backed-off polling intervals (1 second)
pub const DEFAULT_MAX_POLL_INTERVAL_MS: u64 = 1_000;

/// Wait class selecting a policy preset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitClass {
    /// Element attached/visible
    #[default]
    Structural,
    /// Content populated
    Data,
}

/// Bounds for one wait
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitPolicy {
    /// Give up once this much time has elapsed
    pub timeout: Duration,
    /// Delay between checks
    pub poll_interval: Duration,
    /// Multiplier applied to the interval after each failed check (>= 1)
    pub backoff_factor: f64,
    /// Upper bound for the backed-off interval
    pub max_poll_interval: Duration,
    /// Extra delay after success
    pub settle: Duration,
}

impl WaitPolicy {
    /// Fixed-interval policy without settle delay
    #[must_use]
    pub const fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            backoff_factor: 1.0,
            max_poll_interval: poll_interval,
            settle: Duration::ZERO,
        }
    }

    /// Structural preset: 10s, 100ms polling
    #[must_use]
    pub const fn structural() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_STRUCTURAL_TIMEOUT_MS),
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        )
    }

    /// Data preset: 20s, 100ms polling, 2s settle
    #[must_use]
    pub const fn data() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_DATA_TIMEOUT_MS),
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        )
        .with_settle(Duration::from_millis(DEFAULT_SETTLE_MS))
    }

    /// Set timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Exponential backoff, capped at `max_poll_interval`
    #[must_use]
    pub const fn with_backoff(mut self, factor: f64, max_poll_interval: Duration) -> Self {
        self.backoff_factor = factor;
        self.max_poll_interval = max_poll_interval;
        self
    }

    /// Set settle delay
    #[must_use]
    pub const fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Interval to use after a failed check that waited `current`
    #[must_use]
    pub fn next_interval(&self, current: Duration) -> Duration {
        if self.backoff_factor <= 1.0 {
            return self.poll_interval;
        }
        let cap = self.max_poll_interval.max(self.poll_interval);
        current.mul_f64(self.backoff_factor).clamp(self.poll_interval, cap)
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::structural()
    }
}

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T, E> {
    /// Condition met
    Ready(T),
    /// Not yet; keep polling
    Retry(E),
    /// Stop immediately, retrying cannot help
    Abort(E),
}

/// Check count and time spent in a wait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitStats {
    /// Number of checks
    pub attempts: u32,
    /// Time from first check to give-up or success (settle excluded)
    pub elapsed: Duration,
}

/// Why a wait ended without success
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitError<E> {
    /// Timeout elapsed; carries the last retryable failure
    TimedOut {
        /// Last check failure
        last: E,
        /// Wait statistics
        stats: WaitStats,
    },
    /// Check aborted
    Aborted {
        /// Abort reason
        error: E,
        /// Wait statistics
        stats: WaitStats,
    },
}

impl<E> WaitError<E> {
    /// Wait statistics
    #[must_use]
    pub const fn stats(&self) -> WaitStats {
        match self {
            Self::TimedOut { stats, .. } | Self::Aborted { stats, .. } => *stats,
        }
    }

    /// Last check failure or abort reason
    pub fn into_inner(self) -> E {
        match self {
            Self::TimedOut { last, .. } => last,
            Self::Aborted { error, .. } => error,
        }
    }

    /// True if the wait gave up on time
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

/// Poll `check` until it is ready, aborts, or `policy.timeout` elapses.
///
/// Gives up at most one poll interval after the timeout; the settle delay is
/// applied only after success.
pub async fn retry_until<T, E, F, Fut>(
    policy: &WaitPolicy,
    mut check: F,
) -> Result<(T, WaitStats), WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollOutcome<T, E>>,
{
    let start = Instant::now();
    let mut interval = policy.poll_interval.max(MIN_POLL_INTERVAL);
    let mut attempts = 0u32;

    loop {
        attempts = attempts.saturating_add(1);
        let outcome = check().await;
        let stats = WaitStats {
            attempts,
            elapsed: start.elapsed(),
        };
        match outcome {
            PollOutcome::Ready(value) => {
                if !policy.settle.is_zero() {
                    tokio::time::sleep(policy.settle).await;
                }
                return Ok((value, stats));
            }
            PollOutcome::Abort(error) => return Err(WaitError::Aborted { error, stats }),
            PollOutcome::Retry(last) => {
                if stats.elapsed >= policy.timeout {
                    tracing::debug!(
                        attempts,
                        elapsed_ms = stats.elapsed.as_millis() as u64,
                        "wait gave up"
                    );
                    return Err(WaitError::TimedOut { last, stats });
                }
                tokio::time::sleep(interval).await;
                interval = policy.next_interval(interval).max(MIN_POLL_INTERVAL);
            }
        }
    }
}

/// Poll a boolean predicate; `true` if it held before `timeout` elapsed.
pub async fn await_condition<F, Fut>(predicate: F, timeout: Duration, poll_interval: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut predicate = predicate;
    let policy = WaitPolicy::new(timeout, poll_interval);
    retry_until(&policy, || {
        let check = predicate();
        async move {
            if check.await {
                PollOutcome::Ready(())
            } else {
                PollOutcome::<(), ()>::Retry(())
            }
        }
    })
    .await
    .is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    mod policy_tests {
        use super::*;

        #[test]
        fn test_presets() {
            let s = WaitPolicy::structural();
            assert_eq!(s.timeout, ms(10_000));
            assert_eq!(s.poll_interval, ms(100));
            assert_eq!(s.settle, Duration::ZERO);

            let d = WaitPolicy::data();
            assert_eq!(d.timeout, ms(20_000));
            assert_eq!(d.settle, ms(2_000));
        }

        #[test]
        fn test_backoff_schedule_is_capped() {
            let p = WaitPolicy::new(ms(10_000), ms(100)).with_backoff(2.0, ms(500));
            let mut interval = p.poll_interval;
            let mut seen = vec![interval];
            for _ in 0..4 {
                interval = p.next_interval(interval);
                seen.push(interval);
            }
            assert_eq!(seen, vec![ms(100), ms(200), ms(400), ms(500), ms(500)]);
        }

        #[test]
        fn test_no_backoff_keeps_interval() {
            let p = WaitPolicy::structural();
            assert_eq!(p.next_interval(ms(100)), ms(100));
        }
    }

    mod retry_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_ready_immediately() {
            let (value, stats) = retry_until(&WaitPolicy::structural(), || async {
                PollOutcome::<_, ()>::Ready(7)
            })
            .await
            .unwrap();
            assert_eq!(value, 7);
            assert_eq!(stats.attempts, 1);
            assert_eq!(stats.elapsed, Duration::ZERO);
        }

        #[tokio::test(start_paused = true)]
        async fn test_ready_after_polls() {
            let calls = Arc::new(Mutex::new(0));
            let policy = WaitPolicy::new(ms(5_000), ms(100));
            let (_, stats) = retry_until(&policy, || {
                let calls = Arc::clone(&calls);
                async move {
                    let mut n = calls.lock().unwrap();
                    *n += 1;
                    if *n >= 3 {
                        PollOutcome::Ready(())
                    } else {
                        PollOutcome::Retry(())
                    }
                }
            })
            .await
            .unwrap();
            assert_eq!(stats.attempts, 3);
            assert_eq!(stats.elapsed, ms(200));
        }

        #[tokio::test(start_paused = true)]
        async fn test_timeout_is_bounded() {
            let policy = WaitPolicy::new(ms(1_000), ms(100));
            let start = Instant::now();
            let err = retry_until(&policy, || async { PollOutcome::<(), _>::Retry("absent") })
                .await
                .unwrap_err();
            let waited = start.elapsed();
            assert!(err.is_timeout());
            assert!(waited >= policy.timeout);
            assert!(waited <= policy.timeout + policy.poll_interval);
            assert_eq!(err.into_inner(), "absent");
        }

        #[tokio::test(start_paused = true)]
        async fn test_checks_are_spaced_by_poll_interval() {
            let stamps = Arc::new(Mutex::new(Vec::new()));
            let policy = WaitPolicy::new(ms(1_000), ms(250));
            let _ = retry_until(&policy, || {
                let stamps = Arc::clone(&stamps);
                async move {
                    stamps.lock().unwrap().push(Instant::now());
                    PollOutcome::<(), ()>::Retry(())
                }
            })
            .await;
            let stamps = stamps.lock().unwrap();
            assert!(stamps.len() >= 2);
            for pair in stamps.windows(2) {
                assert!(pair[1] - pair[0] >= policy.poll_interval);
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_abort_stops_immediately() {
            let err = retry_until(&WaitPolicy::structural(), || async {
                PollOutcome::<(), _>::Abort("ambiguous")
            })
            .await
            .unwrap_err();
            assert!(!err.is_timeout());
            assert_eq!(err.stats().attempts, 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_settle_applied_after_success() {
            let policy = WaitPolicy::new(ms(1_000), ms(100)).with_settle(ms(2_000));
            let start = Instant::now();
            retry_until(&policy, || async { PollOutcome::<_, ()>::Ready(()) })
                .await
                .unwrap();
            assert_eq!(start.elapsed(), ms(2_000));
        }
    }

    mod await_condition_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_true_when_condition_becomes_true() {
            let start = Instant::now();
            let ok = await_condition(
                || async move { start.elapsed() >= ms(500) },
                ms(5_000),
                ms(100),
            )
            .await;
            assert!(ok);
            assert_eq!(start.elapsed(), ms(500));
        }

        #[tokio::test(start_paused = true)]
        async fn test_zero_interval_is_clamped() {
            let checks = Arc::new(Mutex::new(0u32));
            let start = Instant::now();
            let ok = await_condition(
                || {
                    let checks = Arc::clone(&checks);
                    async move {
                        *checks.lock().unwrap() += 1;
                        false
                    }
                },
                ms(50),
                Duration::ZERO,
            )
            .await;
            assert!(!ok);
            assert!(start.elapsed() >= ms(50));
            assert!(*checks.lock().unwrap() <= 51);
        }

        #[tokio::test(start_paused = true)]
        async fn test_false_on_timeout() {
            let ok = await_condition(|| async { false }, ms(300), ms(100)).await;
            assert!(!ok);
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_give_up_within_timeout_plus_interval(timeout_ms in 1u64..5_000, poll_ms in 1u64..500) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .start_paused(true)
                    .build()
                    .unwrap();
                let policy = WaitPolicy::new(ms(timeout_ms), ms(poll_ms));
                let waited = rt.block_on(async {
                    let start = Instant::now();
                    let _ = retry_until(&policy, || async { PollOutcome::<(), ()>::Retry(()) }).await;
                    start.elapsed()
                });
                prop_assert!(waited >= policy.timeout);
                prop_assert!(waited <= policy.timeout + policy.poll_interval);
            }
        }
    }
}
