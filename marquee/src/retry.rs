//! Synchronous call-with-retry wrapper for outbound calls.
//!
//! Only transient failures (timeouts, dropped connections) are retried; the
//! delay before retry `k` is `backoff_factor * 2^(k-1)` seconds and is slept
//! on the calling thread.

use std::fmt::Display;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::RetrySettings;

/// Classifies an error as worth retrying or not.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Per-call overrides. Unset fields fall back to the configured
/// [`RetrySettings`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RetryPolicy {
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub backoff_factor: Option<f64>,
}

impl RetryPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = Some(backoff_factor);
        self
    }
}

/// Fully resolved policy used for one call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectivePolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_factor: f64,
}

/// Delay slept before retry number `retry` (1-based). Saturates at
/// `Duration::MAX`.
pub fn backoff_delay(backoff_factor: f64, retry: u32) -> Duration {
    if retry == 0 || backoff_factor <= 0.0 || !backoff_factor.is_finite() {
        return Duration::ZERO;
    }
    let exp = (retry - 1).min(30) as i32;
    Duration::try_from_secs_f64(backoff_factor * 2f64.powi(exp)).unwrap_or(Duration::MAX)
}

type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Executes an operation, retrying transient failures.
pub struct RetryableCaller {
    defaults: RetrySettings,
    sleeper: Sleeper,
}

impl RetryableCaller {
    pub fn new(defaults: RetrySettings) -> Self {
        Self {
            defaults,
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replace the blocking sleep, e.g. to record delays in tests.
    pub fn with_sleeper<F>(mut self, sleeper: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn resolve(&self, policy: &RetryPolicy) -> EffectivePolicy {
        EffectivePolicy {
            timeout: policy
                .timeout
                .unwrap_or_else(|| Duration::from_secs(self.defaults.timeout_secs)),
            max_retries: policy.max_retries.unwrap_or(self.defaults.max_retries),
            backoff_factor: policy
                .backoff_factor
                .unwrap_or(self.defaults.backoff_factor),
        }
    }

    /// Run `op`, passing it the per-attempt timeout.
    ///
    /// Non-transient errors are returned immediately. When retries are
    /// exhausted the last transient error is returned.
    pub fn call<T, E, F>(&self, label: &str, policy: &RetryPolicy, mut op: F) -> Result<T, E>
    where
        E: Transient + Display,
        F: FnMut(Duration) -> Result<T, E>,
    {
        let policy = self.resolve(policy);
        debug!(
            call = label,
            max_retries = policy.max_retries,
            timeout_secs = policy.timeout.as_secs_f64(),
            "Starting outbound call"
        );

        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                let delay = backoff_delay(policy.backoff_factor, attempt);
                info!(
                    call = label,
                    "Retry attempt {}/{} after {:.2}s backoff",
                    attempt,
                    policy.max_retries,
                    delay.as_secs_f64()
                );
                (self.sleeper)(delay);
            }

            let started = Instant::now();
            match op(policy.timeout) {
                Ok(value) => {
                    debug!(
                        call = label,
                        attempts = attempt + 1,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Outbound call completed"
                    );
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        call = label,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Attempt {}/{} failed: {}",
                        attempt + 1,
                        policy.max_retries + 1,
                        e
                    );
                    if attempt >= policy.max_retries {
                        error!(
                            call = label,
                            "Outbound call failed after {} attempts: {}",
                            attempt + 1,
                            e
                        );
                        return Err(e);
                    }
                }
                Err(e) => {
                    error!(call = label, "Outbound call failed with non-retryable error: {}", e);
                    return Err(e);
                }
            }
            attempt += 1;
        }
    }
}

impl Default for RetryableCaller {
    fn default() -> Self {
        Self::new(RetrySettings::default())
    }
}
