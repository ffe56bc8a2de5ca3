//! The one bounded poll primitive every wait in the engine goes through.

use crate::AutomationError;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// Runs `probe` until it yields `Some`, or until `timeout` has elapsed.
///
/// The probe always runs at least once, and once more at the deadline.
/// Timing out is `Ok(None)`; only probe errors are errors. There is no
/// retry beyond the deadline and no cancellation other than the timeout.
pub async fn poll_until<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<Option<T>, AutomationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, AutomationError>>,
{
    let start = Instant::now();
    let interval = interval.max(Duration::from_millis(1));
    let mut ticks = 0u32;

    loop {
        ticks += 1;
        if let Some(found) = probe().await? {
            trace!(ticks, elapsed_ms = start.elapsed().as_millis() as u64, "poll satisfied");
            return Ok(Some(found));
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            trace!(ticks, "poll timed out after {:?}", timeout);
            return Ok(None);
        }
        sleep(interval.min(timeout - elapsed)).await;
    }
}

/// Polls until `probe` reports true.
pub async fn poll_condition<F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<bool, AutomationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, AutomationError>>,
{
    let found = poll_until(timeout, interval, || {
        let fut = probe();
        async move { Ok(fut.await?.then_some(())) }
    })
    .await?;
    Ok(found.is_some())
}

/// Fixed settle wait after a step whose effect has no completion signal.
pub async fn settle(duration: Duration) {
    if !duration.is_zero() {
        trace!("settling for {:?}", duration);
        sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_times_out_with_none() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let started = Instant::now();
        let result: Option<()> = poll_until(Duration::from_millis(500), Duration::from_millis(100), || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Ok(None) }
        })
        .await
        .unwrap();
        assert!(result.is_none());
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_millis(600));
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = poll_until(Duration::from_secs(5), Duration::from_millis(100), || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move { Ok((n >= 2).then_some(n)) }
        })
        .await
        .unwrap();
        assert_eq!(result, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_errors_propagate() {
        let result: Result<Option<()>, _> =
            poll_until(Duration::from_secs(1), Duration::from_millis(100), || async {
                Err(AutomationError::Bridge("gone".into()))
            })
            .await;
        assert!(matches!(result, Err(AutomationError::Bridge(_))));
    }
}
