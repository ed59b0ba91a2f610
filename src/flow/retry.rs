//! Retry with exponential backoff

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// How often and how patiently an operation is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub attempts: u32,
    /// Delay after the first failed attempt; doubled after each further one
    pub base: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base,
        }
    }

    /// Delay to sleep after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        backoff_delay(self.base, attempt)
    }
}

/// Computes `base * 2^(attempt - 1)`, saturating instead of overflowing
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use stellwerk::flow::backoff_delay;
///
/// let base = Duration::from_secs(5);
/// assert_eq!(backoff_delay(base, 1), Duration::from_secs(5));
/// assert_eq!(backoff_delay(base, 3), Duration::from_secs(20));
/// ```
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}

/// Returned when every attempt failed
#[derive(Debug)]
pub struct RetryError<E> {
    /// Number of attempts made
    pub attempts: u32,
    /// Error of the final attempt
    pub last: E,
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} attempts: {}", self.attempts, self.last)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last)
    }
}

/// Runs `operation` until it succeeds or the policy's attempts are used up
///
/// The operation receives the 1-based attempt number. Between attempts the
/// task sleeps for `backoff_delay(policy.base, attempt)`.
///
/// # Arguments
///
/// * `policy` - Attempt count and base delay
/// * `operation` - Produces one attempt's future
///
/// # Returns
///
/// * `Ok(T)` - Result of the first successful attempt
/// * `Err(RetryError<E>)` - The last error and the number of attempts made
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                return Err(RetryError { attempts: attempt, last: e });
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                debug!(attempt, ?delay, error = %e, "Attempt failed, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), base);
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 5), Duration::from_millis(1600));
        assert_eq!(backoff_delay(Duration::MAX, 40), Duration::MAX);
    }

    #[test]
    fn test_policy_needs_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(1));

        let result: Result<u32, RetryError<String>> = retry_with_backoff(policy, |attempt| {
            calls.set(calls.get() + 1);
            async move {
                if attempt < 3 {
                    Err(format!("attempt {} failed", attempt))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_error() {
        let start = tokio::time::Instant::now();
        let policy = RetryPolicy::new(3, Duration::from_secs(1));

        let result: Result<(), RetryError<String>> =
            retry_with_backoff(policy, |attempt| async move { Err(format!("no {}", attempt)) })
                .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.last, "no 3");
        // 1s + 2s of backoff, no sleep after the final attempt
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }
}
