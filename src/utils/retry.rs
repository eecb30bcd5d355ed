//! 指數退避重試。只針對 [`HarvestError::is_retryable`] 的錯誤重試，
//! 其餘錯誤直接回傳給呼叫端記錄為失敗。

use crate::utils::error::{HarvestError, Result};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
            backoff_factor: 2,
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次重試前的等待時間：base * factor^attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }
}

pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let wait = policy.delay_for(attempt);
                tracing::warn!(
                    "⏳ {}: {} (retry {}/{}), waiting {:?}",
                    label,
                    short(&e),
                    attempt + 1,
                    policy.max_retries,
                    wait
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn short(e: &HarvestError) -> String {
    crate::utils::error::truncate_message(&e.to_string(), 100)
}
