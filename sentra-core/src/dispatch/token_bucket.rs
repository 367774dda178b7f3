//! Token-bucket rate limiter for outbound alert deliveries.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Fixed-rate token bucket. Shared, mutually exclusive state; the mutex is
/// held only to account tokens, never across an await.
pub struct TokenBucket {
    rate_per_sec: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// `rate_per_sec` tokens refill per second up to a `burst` ceiling.
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate_per_sec: f64::from(rate_per_sec.max(1)),
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available, otherwise report how long until one
    /// refills.
    fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let elapsed = state.last_refill.elapsed();
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.rate_per_sec).min(self.burst);
        state.last_refill = Instant::now();

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(deficit / self.rate_per_sec))
        }
    }

    /// Wait until a token is available and consume it.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => sleep(wait).await,
            }
        }
    }
}
