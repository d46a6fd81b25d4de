use crate::utils::error::{HarvestError, Result};
use crate::utils::validation::{validate_range, Validate};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// 重試次數上限；超過時 2^n 退避已無意義
pub const MAX_RETRIES_LIMIT: u32 = 10;
const MAX_BACKOFF_FACTOR_SECS: f64 = 3600.0;

/// 遇到暫時性閘道錯誤（502/503）時以指數退避重試
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor_secs: f64,
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor_secs: 1.0,
            retry_statuses: vec![502, 503],
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_factor: Duration, retry_statuses: Vec<u16>) -> Self {
        Self {
            max_retries,
            backoff_factor_secs: backoff_factor.as_secs_f64(),
            retry_statuses,
        }
    }

    /// 第 `attempt` 次失敗後的等待時間：backoff_factor * 2^attempt
    pub fn delay_for(&self, attempt: u32) -> Result<Duration> {
        let secs = self.backoff_factor_secs * 2f64.powi(attempt.min(i32::MAX as u32) as i32);
        Duration::try_from_secs_f64(secs).map_err(|e| HarvestError::InvalidConfigValueError {
            field: "sources.retry.backoff_factor_secs".to_string(),
            value: self.backoff_factor_secs.to_string(),
            reason: format!("Backoff delay for attempt {} is not a valid duration: {}", attempt, e),
        })
    }

    pub fn is_retryable(&self, err: &HarvestError) -> bool {
        err.status_code()
            .is_some_and(|status| self.retry_statuses.contains(&status))
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_retries` calls have all failed with a retryable status.
    pub async fn run<T, F, Fut>(&self, span: &tracing::Span, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0u32;
        let mut last_status = 0u16;

        while attempts < self.max_retries {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if self.is_retryable(&e) => {
                    attempts += 1;
                    last_status = e.status_code().unwrap_or_default();
                    if attempts >= self.max_retries {
                        break;
                    }
                    let delay = self.delay_for(attempts)?;
                    tracing::warn!(
                        parent: span,
                        "🔄 HTTP {} (attempt {}/{}), retrying in {:?}",
                        last_status,
                        attempts,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::error!(
            parent: span,
            "❌ Max retries exceeded after {} attempts (last status {}). Giving up.",
            attempts,
            last_status
        );
        Err(HarvestError::RetryExhausted {
            attempts,
            last_status,
        })
    }
}

impl Validate for RetryPolicy {
    fn validate(&self) -> Result<()> {
        validate_range("sources.retry.max_retries", self.max_retries, 1, MAX_RETRIES_LIMIT)?;
        if !self.backoff_factor_secs.is_finite() {
            return Err(HarvestError::InvalidConfigValueError {
                field: "sources.retry.backoff_factor_secs".to_string(),
                value: self.backoff_factor_secs.to_string(),
                reason: "Value must be a finite number of seconds".to_string(),
            });
        }
        validate_range(
            "sources.retry.backoff_factor_secs",
            self.backoff_factor_secs,
            0.0,
            MAX_BACKOFF_FACTOR_SECS,
        )
    }
}
