//! Proactive call spacing for rate-limited upstream services.
//!
//! A [`RateLimiter`] enforces a minimum interval between outbound calls.
//! It is an explicit value owned by whoever makes the calls; share one
//! instance through an `Arc` when several components draw on the same quota
//! (e.g. chat completions and embeddings on one API key).

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

/// Minimum-spacing limiter.
///
/// The lock is held across the wait and the timestamp update, so concurrent
/// callers queue up and each one still observes the full spacing.
#[derive(Debug)]
pub struct RateLimiter {
    min_spacing: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter with the given minimum spacing and no prior call.
    #[must_use]
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_call: Mutex::new(None),
        }
    }

    /// A limiter that never waits.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Waits until the spacing allows another call, then records the call
    /// time. Call immediately before the outbound request.
    ///
    /// Returns how long this call waited.
    pub async fn acquire(&self) -> Duration {
        let mut last = self.last_call.lock().await;
        let mut waited = Duration::ZERO;

        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_spacing {
                waited = self.min_spacing - elapsed;
                info!(
                    wait_secs = waited.as_secs_f64(),
                    "rate limiting: waiting before outbound call"
                );
                tokio::time::sleep(waited).await;
            }
        }

        *last = Some(Instant::now());
        waited
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_does_not_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert_eq!(limiter.acquire().await, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_waits_remaining_spacing() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(4)).await;

        let start = Instant::now();
        let waited = limiter.acquire().await;
        assert_eq!(waited, Duration::from_secs(6));
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_spacing_elapsed() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_serialized() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(10)));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap_or_else(|_| unreachable!()));
        }
        times.sort();
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(10));
        }
    }

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }
}
