//! Condition polling with a deadline

use super::FlowError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Polls `condition` every `interval` until it returns true
///
/// The condition is checked once more at the deadline, so a condition that
/// becomes true during the last interval is still seen.
///
/// # Returns
///
/// * `Ok(())` - The condition held before the timeout elapsed
/// * `Err(FlowError::Timeout)` - The timeout elapsed first
pub async fn wait_for<F, Fut>(
    mut condition: F,
    timeout: Duration,
    interval: Duration,
) -> Result<(), FlowError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if condition().await {
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(FlowError::Timeout(timeout));
        }

        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
