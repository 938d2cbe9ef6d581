use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use qa_core::errors::GatewayError;
use qa_core::worker::{Worker, WorkerCall};

/// Retry behavior for [`RetryingWorker`].
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(20),
        }
    }
}

/// Wraps a worker with transport-level retries.
///
/// - Only retryable errors (rate limit, 5xx, network) are retried
/// - Respects `retry_after` hints from rate limit responses
/// - Fatal errors and timeouts are returned immediately
pub struct RetryingWorker<W: Worker> {
    inner: W,
    config: RetryConfig,
    total_retries: AtomicU64,
}

impl<W: Worker> RetryingWorker<W> {
    pub fn new(inner: W, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            total_retries: AtomicU64::new(0),
        }
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt, capped.
    fn retry_delay(&self, attempt: u32, suggested: Option<Duration>) -> Duration {
        if let Some(delay) = suggested {
            return delay.min(self.config.max_delay);
        }
        let factor = 2u32.saturating_pow(attempt);
        self.config.base_delay.saturating_mul(factor).min(self.config.max_delay)
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<W: Worker> Worker for RetryingWorker<W> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn supports_attachments(&self) -> bool {
        self.inner.supports_attachments()
    }

    async fn invoke(&self, call: &WorkerCall) -> Result<String, GatewayError> {
        let mut attempt = 0;
        loop {
            match self.inner.invoke(call).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.retry_delay(attempt, e.suggested_delay());
                    warn!(
                        worker = call.role.name(),
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error_kind = e.error_kind(),
                        "retrying worker call"
                    );
                    self.total_retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
