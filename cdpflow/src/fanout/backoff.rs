//! Backoff policy for transient task failures.
//!
//! The policy is a plain value injected into the fan-out runner: the delay
//! before retry `n` (0-indexed) is `initial_interval * multiplier^n`, capped
//! at `max_interval` when one is set, then jittered.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Retry schedule for the concurrency-exhaustion condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Retries after the initial invocation.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    /// Growth factor applied per retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Optional delay cap in milliseconds.
    #[serde(default)]
    pub max_interval_ms: Option<u64>,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_interval_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    1.1
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_interval_ms: default_initial_interval_ms(),
            multiplier: default_multiplier(),
            max_interval_ms: None,
            jitter: JitterStrategy::None,
        }
    }
}

impl BackoffPolicy {
    /// Creates the default policy (10 retries, 60s, x1.1).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::default().with_max_attempts(0)
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial interval.
    #[must_use]
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval_ms = Some(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Checks the policy for values that cannot produce a schedule.
    pub fn validate(&self) -> Result<(), String> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "backoff multiplier must be >= 1.0, got {}",
                self.multiplier
            ));
        }
        if let Some(max) = self.max_interval_ms {
            if max < self.initial_interval_ms {
                return Err(format!(
                    "max interval {max}ms is below the initial interval {}ms",
                    self.initial_interval_ms
                ));
            }
        }
        Ok(())
    }

    /// Returns the un-jittered delay before retry `retry` (0-indexed).
    #[must_use]
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let mut millis = self.initial_interval_ms as f64 * self.multiplier.powi(exponent);
        if let Some(max) = self.max_interval_ms {
            #[allow(clippy::cast_precision_loss)]
            let cap = max as f64;
            millis = millis.min(cap);
        }
        Duration::try_from_secs_f64(millis.max(0.0) / 1000.0).unwrap_or(Duration::MAX)
    }

    /// Returns the jittered delay before retry `retry`.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        let millis = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);

        let jittered = match self.jitter {
            JitterStrategy::None => return base,
            JitterStrategy::Full => {
                if millis == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=millis)
                }
            }
            JitterStrategy::Equal => {
                let half = millis / 2;
                if half == 0 {
                    millis
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }

    /// Total un-jittered time spent waiting if every retry is used.
    #[must_use]
    pub fn total_budget(&self) -> Duration {
        (0..self.max_attempts).map(|n| self.base_delay(n)).sum()
    }
}

/// Retry bookkeeping for one operation.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Retries performed so far.
    pub retries: u32,
}

impl RetryState {
    /// Creates a new retry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total invocations so far, including the initial one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }

    /// Returns true if retries are exhausted.
    #[must_use]
    pub fn is_exhausted(&self, policy: &BackoffPolicy) -> bool {
        self.retries >= policy.max_attempts
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more retries, give up.
    GiveUp,
    /// Don't retry, the error is not retryable.
    NotRetryable,
}

/// Makes a retry decision and advances the state when retrying.
#[must_use]
pub fn should_retry(state: &mut RetryState, policy: &BackoffPolicy, retryable: bool) -> RetryDecision {
    if !retryable {
        return RetryDecision::NotRetryable;
    }
    if state.is_exhausted(policy) {
        return RetryDecision::GiveUp;
    }

    let delay = policy.delay(state.retries);
    state.retries += 1;

    RetryDecision::Retry(delay)
}

/// Executes an operation, retrying errors accepted by `is_retryable`.
///
/// Returns the final result together with the number of invocations made.
pub async fn with_retry<T, E, F, Fut, R>(
    policy: &BackoffPolicy,
    key: &str,
    is_retryable: R,
    mut operation: F,
) -> (Result<T, E>, u32)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut state = RetryState::new();

    loop {
        match operation().await {
            Ok(result) => return (Ok(result), state.attempts()),
            Err(e) => match should_retry(&mut state, policy, is_retryable(&e)) {
                RetryDecision::Retry(delay) => {
                    tracing::debug!(
                        key = %key,
                        retry = state.retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Retrying after error"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    tracing::warn!(key = %key, retries = state.retries, error = %e, "Retries exhausted");
                    return (Err(e), state.attempts());
                }
                RetryDecision::NotRetryable => return (Err(e), state.attempts()),
            },
        }
    }
}
