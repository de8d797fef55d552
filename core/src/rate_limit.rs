use governor::{DefaultDirectRateLimiter, Quota};
use std::num::NonZeroU32;
use tracing::debug;

/// Token bucket shared by every request issued through a `Transport`.
pub struct RateLimiter {
    limiter: DefaultDirectRateLimiter,
    per_second: NonZeroU32,
}

impl RateLimiter {
    /// Returns `None` when `per_second` is zero (limiting disabled).
    pub fn per_second(per_second: u32) -> Option<Self> {
        let per_second = NonZeroU32::new(per_second)?;
        Some(Self {
            limiter: governor::RateLimiter::direct(Quota::per_second(per_second)),
            per_second,
        })
    }

    pub async fn acquire(&self) {
        if self.limiter.check().is_err() {
            debug!(limit = self.per_second.get(), "Rate limit reached, waiting");
            self.limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("per_second", &self.per_second)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_disables_limiting() {
        assert!(RateLimiter::per_second(0).is_none());
        assert!(RateLimiter::per_second(5).is_some());
    }

    #[tokio::test]
    async fn burst_within_quota_does_not_wait() {
        let limiter = RateLimiter::per_second(10).expect("limiter");
        let started = std::time::Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(started.elapsed() < std::time::Duration::from_millis(500));
    }
}
