//! Fixed-delay retry that only waits out rate limiting.

use crate::clock::Clock;
use providers::ServiceError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    delay: Duration,
}

/// Value produced by a retried operation plus how many retries it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    pub retries: u32,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn should_retry(err: &ServiceError) -> bool {
        err.is_rate_limited()
    }

    /// Runs `operation` until it succeeds or fails with a non-retryable error.
    /// There is no attempt cap: throttling is expected under bulk upload.
    pub async fn execute<F, Fut, T>(
        &self,
        clock: &dyn Clock,
        mut operation: F,
    ) -> Result<Retried<T>, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut retries = 0u32;
        loop {
            match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(retries, "succeeded after rate limiting");
                    }
                    return Ok(Retried { value, retries });
                }
                Err(err) if Self::should_retry(&err) => {
                    retries += 1;
                    warn!(
                        "Rate limit hit ({}), sleeping {:?} and retrying",
                        err, self.delay
                    );
                    clock.sleep(self.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
