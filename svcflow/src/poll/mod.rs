//! Bounded poll-until-terminal loop.
//!
//! One generic loop serves every resource kind: a fetch producing an
//! [`Observation`], a [`TerminalStateSet`] deciding whether that
//! observation ends the loop, and a [`PollPolicy`] bounding how often and
//! how long to ask. The delay between attempts is fixed; the attempt
//! budget times the interval is the wall-clock ceiling for the resource.

use crate::core::{Observation, PollOutcome, StatusClass, TerminalStateSet};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Attempt budget and fixed delay for a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PollPolicyRepr", into = "PollPolicyRepr")]
pub struct PollPolicy {
    max_attempts: u32,
    interval: Duration,
}

impl PollPolicy {
    /// Creates a poll policy.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `max_attempts` is zero.
    pub fn new(max_attempts: u32, interval: Duration) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
        }
        Ok(Self {
            max_attempts,
            interval,
        })
    }

    /// Returns the attempt budget.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay between attempts.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the wall-clock ceiling, `max_attempts × interval`.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

#[derive(Serialize, Deserialize)]
struct PollPolicyRepr {
    max_attempts: u32,
    interval_ms: u64,
}

impl TryFrom<PollPolicyRepr> for PollPolicy {
    type Error = ConfigError;

    fn try_from(repr: PollPolicyRepr) -> Result<Self, Self::Error> {
        Self::new(repr.max_attempts, Duration::from_millis(repr.interval_ms))
    }
}

impl From<PollPolicy> for PollPolicyRepr {
    fn from(policy: PollPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            interval_ms: u64::try_from(policy.interval.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Why a poll loop ended without a terminal state.
#[derive(Debug)]
pub enum PollError<E> {
    /// The budget ran out while the resource was still pending.
    ///
    /// Carries the last (non-terminal) outcome.
    Timeout(PollOutcome),
    /// The fetch itself failed. Never retried.
    Fetch {
        /// The attempt on which the fetch failed.
        attempt: u32,
        /// The fetch error.
        error: E,
    },
}

impl<E: fmt::Display> fmt::Display for PollError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(last) => write!(
                f,
                "Poll timed out after {} attempt(s); last status: '{}'",
                last.attempt, last.status
            ),
            Self::Fetch { attempt, error } => {
                write!(f, "Poll fetch failed on attempt {attempt}: {error}")
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for PollError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Timeout(_) => None,
            Self::Fetch { error, .. } => Some(error),
        }
    }
}

/// Polls until a terminal state or the attempt budget is exhausted.
///
/// `fetch` receives the 1-indexed attempt number and is awaited to
/// completion before anything else happens, so attempts never overlap.
/// A `Success` or `Failure` classification returns at once. After a
/// `Pending` attempt the loop sleeps for the policy interval, except
/// after the last attempt, which returns `PollError::Timeout` directly.
///
/// # Errors
///
/// Returns `PollError::Timeout` when the budget is exhausted and
/// `PollError::Fetch` as soon as a fetch fails.
pub async fn poll<F, Fut, E>(
    mut fetch: F,
    terminal: &TerminalStateSet,
    policy: &PollPolicy,
) -> Result<PollOutcome, PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Observation, E>>,
{
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let observation = fetch(attempt)
            .await
            .map_err(|error| PollError::Fetch { attempt, error })?;

        let class = terminal.classify(&observation.status, &observation.extracted);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let outcome = PollOutcome::from_observation(observation, attempt, elapsed_ms, class);

        debug!(
            attempt,
            max_attempts = policy.max_attempts,
            status = %outcome.status,
            class = %class,
            elapsed_ms,
            "Poll attempt"
        );

        if class != StatusClass::Pending {
            return Ok(outcome);
        }
        if attempt >= policy.max_attempts {
            return Err(PollError::Timeout(outcome));
        }
        tokio::time::sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn deployment() -> TerminalStateSet {
        TerminalStateSet::new().success("Completed").failure("Failed")
    }

    fn policy(max_attempts: u32) -> PollPolicy {
        PollPolicy::new(max_attempts, Duration::from_secs(4)).unwrap()
    }

    /// Fetch that replays statuses and counts calls.
    fn scripted(
        statuses: &[&str],
    ) -> (
        Arc<AtomicU32>,
        impl FnMut(u32) -> std::future::Ready<Result<Observation, String>>,
    ) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut queue: VecDeque<String> = statuses.iter().map(|s| (*s).to_string()).collect();
        let fetch = move |_attempt| {
            counter.fetch_add(1, Ordering::SeqCst);
            let status = queue.pop_front().unwrap_or_else(|| "Pending".to_string());
            std::future::ready(Ok(Observation::status(status)))
        };
        (calls, fetch)
    }

    #[test]
    fn test_policy_rejects_zero_attempts() {
        assert!(PollPolicy::new(0, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_policy_ceiling() {
        assert_eq!(policy(20).ceiling(), Duration::from_secs(80));
    }

    #[test]
    fn test_policy_serde_shape() {
        let json = serde_json::to_value(policy(15)).unwrap();
        assert_eq!(json, serde_json::json!({"max_attempts": 15, "interval_ms": 4000}));

        let bad: Result<PollPolicy, _> =
            serde_json::from_value(serde_json::json!({"max_attempts": 0, "interval_ms": 10}));
        assert!(bad.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_pending() {
        let (calls, fetch) = scripted(&["Pending", "Completed"]);
        let started = Instant::now();

        let outcome = poll(fetch, &deployment(), &policy(20)).await.unwrap();

        assert_eq!(outcome.class, StatusClass::Success);
        assert_eq!(outcome.status, "Completed");
        assert_eq!(outcome.attempt, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_returns_immediately() {
        let (calls, fetch) = scripted(&["Failed"]);
        let started = Instant::now();

        let outcome = poll(fetch, &deployment(), &policy(20)).await.unwrap();

        assert_eq!(outcome.class, StatusClass::Failure);
        assert_eq!(outcome.attempt, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_times_out_without_sleep() {
        let (calls, fetch) = scripted(&["Pending"]);
        let started = Instant::now();

        let err = poll(fetch, &deployment(), &policy(1)).await.unwrap_err();

        match err {
            PollError::Timeout(last) => {
                assert_eq!(last.status, "Pending");
                assert_eq!(last.attempt, 1);
                assert_eq!(last.class, StatusClass::Pending);
            }
            PollError::Fetch { .. } => panic!("expected timeout"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_bounds_wall_clock() {
        let (calls, fetch) = scripted(&[]);
        let started = Instant::now();

        let err = poll(fetch, &deployment(), &policy(20)).await.unwrap_err();

        assert!(matches!(err, PollError::Timeout(ref last) if last.attempt == 20));
        assert_eq!(calls.load(Ordering::SeqCst), 20);
        // 19 sleeps between 20 attempts, none after the last one.
        assert_eq!(started.elapsed(), Duration::from_secs(76));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let fetch = move |attempt: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 2 {
                    Err("connection reset".to_string())
                } else {
                    Ok(Observation::status("Pending"))
                }
            }
        };

        let err = poll(fetch, &deployment(), &policy(20)).await.unwrap_err();

        match err {
            PollError::Fetch { attempt, error } => {
                assert_eq!(attempt, 2);
                assert_eq!(error, "connection reset");
            }
            PollError::Timeout(_) => panic!("expected fetch error"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_without_required_field_keeps_polling() {
        let set = deployment().requiring("dep_id");
        let mut attempt_seen = 0;
        let fetch = move |attempt: u32| {
            attempt_seen = attempt;
            let observation = if attempt < 3 {
                Observation::status("Completed")
            } else {
                Observation::status("Completed").with_field("dep_id", "D1")
            };
            std::future::ready(Ok::<_, String>(observation))
        };

        let outcome = poll(fetch, &set, &policy(5)).await.unwrap();

        assert_eq!(outcome.attempt, 3);
        assert_eq!(outcome.field("dep_id"), Some("D1"));
    }

    #[test]
    fn test_poll_error_display() {
        let last = PollOutcome::from_observation(
            Observation::status("InProgress"),
            15,
            56_000,
            StatusClass::Pending,
        );
        let err: PollError<String> = PollError::Timeout(last);
        assert_eq!(
            err.to_string(),
            "Poll timed out after 15 attempt(s); last status: 'InProgress'"
        );
    }
}
