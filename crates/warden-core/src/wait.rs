//! Bounded polling.
//!
//! All waiting goes through `tokio::time`, so tests can run on a paused clock
//! and observe the exact probe schedule without sleeping for real.

use std::{future::Future, time::Duration};

use tokio::time::{sleep, Instant};

/// Calls `probe` every `interval` until it yields `Some`, giving up once
/// `timeout` has elapsed. The first probe happens immediately and the last
/// one no later than the deadline.
pub async fn wait_for<T, F, Fut>(timeout: Duration, interval: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }

        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        sleep(interval.min(deadline - now)).await;
    }
}

/// [`wait_for`] for a plain condition. Returns whether it became true in time.
pub async fn wait_until<F, Fut>(timeout: Duration, interval: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    wait_for(timeout, interval, || {
        let check = predicate();
        async move { check.await.then_some(()) }
    })
    .await
    .is_some()
}
