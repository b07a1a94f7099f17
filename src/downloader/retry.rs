use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio_util::sync::CancellationToken;

use crate::downloader::error::FetchCause;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u8,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u8, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// 为请求添加重试, 仅重试可恢复的错误
pub async fn retry_fetch<T, F, Fut>(
    policy: &RetryPolicy,
    cancel_token: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T, FetchCause>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchCause>>,
{
    let mut attempt = 0u32;
    loop {
        let result = tokio::select! {
            res = operation() => res,
            _ = cancel_token.cancelled() => Err(FetchCause::Cancelled),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(cause) if cause.is_retryable() && attempt < u32::from(policy.max_retries) => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                warn!("{label} failed, try again {attempt}/{} in {delay:?}: {cause}", policy.max_retries);

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel_token.cancelled() => return Err(FetchCause::Cancelled),
                }
            }
            Err(cause) => return Err(cause),
        }
    }
}
