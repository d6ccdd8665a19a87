//! Retry policy: exponential backoff with jitter.
//!
//! Shared by the LLM adapter call site (only the adapter call is retried,
//! never the surrounding loop) and by tool dispatch (retry is never
//! attempted on validation failures, only on execution failures).

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter. `None` disables retry.
#[derive(Clone, Copy, Debug)]
pub enum RetryPolicy {
    None,
    Exponential {
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Exponential {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryPolicy::None => 1,
            RetryPolicy::Exponential { max_attempts, .. } => *max_attempts,
        }
    }

    /// Delay before the given (1-based) retry attempt, with up to 50%
    /// jitter applied to avoid thundering-herd retries.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            RetryPolicy::None => Duration::ZERO,
            RetryPolicy::Exponential { base_delay, max_delay, multiplier, .. } => {
                let exp = multiplier.powi(attempt.saturating_sub(1) as i32);
                let raw = base_delay.as_secs_f64() * exp;
                let capped = raw.min(max_delay.as_secs_f64());
                let jitter: f64 = rand::thread_rng().gen_range(0.5..=1.0);
                Duration::from_secs_f64(capped * jitter)
            }
        }
    }

    /// Runs `op` under this policy, retrying on `Err` up to `max_attempts`.
    /// `is_retryable` gates whether a given error should be retried at all
    /// (e.g. validation failures never retry).
    pub async fn run<F, Fut, T, E>(&self, is_retryable: impl Fn(&E) -> bool, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts() && is_retryable(&e) => {
                    tokio::time::sleep(self.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_up_to_max_attempts_then_returns_last_error() {
        let policy = RetryPolicy::Exponential {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 1.0,
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = policy
            .run(|_e: &&str| true, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom") }
            })
            .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = policy
            .run(|_e: &&str| false, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("validation") }
            })
            .await;
        assert_eq!(result, Err("validation"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
