use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

#[derive(Clone)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
}

impl RateLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        RateLimiter {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.semaphore
            .acquire()
            .await
            .map_err(|e| anyhow!("Rate limiter closed: {}", e))
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_returned_on_drop() {
        let limiter = RateLimiter::new(2);
        {
            let _a = limiter.acquire().await.unwrap();
            let _b = limiter.acquire().await.unwrap();
            assert_eq!(limiter.available(), 0);
        }
        assert_eq!(limiter.available(), 2);
    }

    #[test]
    fn zero_is_clamped_to_one() {
        assert_eq!(RateLimiter::new(0).available(), 1);
    }
}
