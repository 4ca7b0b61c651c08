use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use super::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Query,
    Mutation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub const fn for_kind(kind: RequestKind) -> Self {
        let max_attempts = match kind {
            RequestKind::Query => 3,
            RequestKind::Mutation => 2,
        };
        Self {
            max_attempts,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(100),
        }
    }

    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// `attempt` is the number of attempts already made. Client errors are
    /// final; server and transport failures retry until the budget runs out.
    pub fn should_retry(&self, attempt: u32, err: &ApiError) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        match err {
            ApiError::Status { .. } => !err.is_client_error(),
            ApiError::Transport(_) => true,
            ApiError::Decode(_) | ApiError::Url(_) => false,
        }
    }

    /// Exponential backoff before attempt `attempt + 1`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt).as_millis() as i64;
        let spread = self.jitter.as_millis() as i64;
        let offset = if spread > 0 {
            rand::rng().random_range(-spread..=spread)
        } else {
            0
        };
        Duration::from_millis((base + offset).max(0) as u64)
    }

    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(err) if self.should_retry(attempt, &err) => {
                    let wait = self.delay(attempt);
                    warn!("request failed (attempt {}), retrying in {:?}: {}", attempt, wait, err);
                    tokio::time::sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
