//! Per-account outbound rate limiting
//!
//! A smoothed token bucket: permits replenish continuously at the configured
//! rate and accumulate up to a burst ceiling. Each business-account worker
//! owns one limiter; the budget is process-local, so multi-process
//! deployments over-deliver by at most the process count.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token-bucket rate limiter.
///
/// `acquire` never fails; it suspends until a permit is available. Dropping
/// the future while it waits consumes nothing.
pub struct RateLimiter {
    rate_per_sec: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter replenishing `rate_per_sec` permits per second with
    /// at most `burst` permits banked. Values below the minimum are clamped
    /// so a misconfigured account cannot stall its worker forever.
    pub fn new(rate_per_sec: f64, burst: f64) -> Self {
        let rate_per_sec = rate_per_sec.max(0.01);
        let burst = burst.max(1.0);
        Self {
            rate_per_sec,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Limiter for a single smoothed stream: burst of one
    pub fn smoothed(rate_per_sec: f64) -> Self {
        Self::new(rate_per_sec, 1.0)
    }

    /// Wait for one permit and consume it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }

                let deficit = 1.0 - state.tokens;
                Duration::from_secs_f64(deficit / self.rate_per_sec)
            };

            tokio::time::sleep(wait).await;
        }
    }

    /// Record `k` permits consumed outside `acquire`, e.g. when the provider
    /// accepted a batch for a single acquired permit. Never blocks; the debt
    /// delays future acquires instead.
    pub async fn incr(&self, k: u32) {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens -= k as f64;
    }

    /// Permits currently banked (after refill)
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.burst);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn acquire_paces_to_the_configured_rate() {
        let limiter = RateLimiter::smoothed(2.0);
        let start = Instant::now();

        // First permit comes from the banked burst; the next two wait.
        for _ in 0..3 {
            limiter.acquire().await;
        }

        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(1000),
            "three sends at 2/sec should span at least a second, took {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rate_conformance_over_window() {
        let rate = 5.0;
        let limiter = RateLimiter::smoothed(rate);
        let window = Duration::from_secs(2);
        let start = Instant::now();

        let mut sends = 0u64;
        loop {
            limiter.acquire().await;
            if start.elapsed() > window {
                break;
            }
            sends += 1;
        }

        let budget = (rate * window.as_secs_f64() * 1.1) as u64 + 1;
        assert!(
            sends <= budget,
            "{sends} sends exceeded the {budget} budget over {window:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn burst_allows_initial_slack_then_smooths() {
        let limiter = RateLimiter::new(1.0, 3.0);
        let start = Instant::now();

        // Three banked permits are immediate.
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(10));

        // The fourth waits for a refill.
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(990));
    }

    #[tokio::test(start_paused = true)]
    async fn incr_records_batch_consumption() {
        let limiter = RateLimiter::new(1.0, 5.0);
        limiter.incr(5).await;

        let start = Instant::now();
        limiter.acquire().await;
        // The bucket was fully drained by the batch record.
        assert!(start.elapsed() >= Duration::from_millis(990));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_acquire_consumes_nothing() {
        let limiter = RateLimiter::smoothed(1.0);
        limiter.acquire().await; // drain the banked permit

        {
            // Poll an acquire once, then drop it mid-wait.
            let pending = limiter.acquire();
            tokio::pin!(pending);
            let poll = futures::poll!(&mut pending);
            assert!(poll.is_pending());
        }

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.available().await >= 0.99);
    }
}
