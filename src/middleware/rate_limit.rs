// ============================================================================
// Global Rate Limiter
// ============================================================================
//
// A single token bucket shared by every request path, /health included.
// Capacity is the configured burst, refill is rps tokens per second from a
// monotonic clock. Granularity is deliberately coarse; per-IP or
// per-principal buckets would slot in behind the same middleware.
//
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::Request, extract::State, middleware::Next, response::Response};
use parking_lot::Mutex;

use crate::context::AppContext;
use crate::error::GatewayError;

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<Bucket>>,
    rps: u32,
}

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_update: Instant,
}

impl RateLimiter {
    pub fn new(rps: u32, burst: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Bucket {
                tokens: burst as f64,
                capacity: burst as f64,
                refill_rate: rps as f64,
                last_update: Instant::now(),
            })),
            rps,
        }
    }

    /// Take one token, refilling for the elapsed time first
    pub fn allow(&self) -> bool {
        let mut bucket = self.inner.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_update);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * bucket.refill_rate)
            .min(bucket.capacity);
        bucket.last_update = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn rps(&self) -> u32 {
        self.rps
    }
}

pub async fn rate_limit(
    State(ctx): State<AppContext>,
    req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    if let Some(limiter) = &ctx.rate_limiter {
        if !limiter.allow() {
            return Err(GatewayError::RateLimited { rps: limiter.rps() });
        }
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn burst_is_consumed_then_rejected() {
        let limiter = RateLimiter::new(1, 3);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[test]
    fn refill_allows_new_requests() {
        let limiter = RateLimiter::new(1000, 1);
        assert!(limiter.allow());
        assert!(!limiter.allow());
        // 1000 rps refills a token within a few milliseconds
        std::thread::sleep(Duration::from_millis(10));
        assert!(limiter.allow());
    }

    #[test]
    fn tokens_never_exceed_burst_capacity() {
        let limiter = RateLimiter::new(1000, 2);
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.allow());
        assert!(limiter.allow());
        // Capacity is 2 even after a long idle period
        assert!(!limiter.allow());
    }
}
