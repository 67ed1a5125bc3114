use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Places a human-readable message may live on an error, in lookup order.
///
/// Remote failures usually carry the useful text in the response body, so
/// those shapes are consulted first; the error's own message is last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorShape {
    /// `message` field of a structured response body
    ResponseMessage,
    /// `error` field of a structured response body
    ResponseError,
    /// The whole response body
    ResponseBody,
    /// HTTP status line text
    StatusText,
    /// `reason` reported by a nested/inner error
    NestedReason,
    /// Underlying cause
    Cause,
    /// `reason` on the error itself
    Reason,
    /// The error's own message
    Message,
}

impl ErrorShape {
    pub const ORDER: [ErrorShape; 8] = [
        ErrorShape::ResponseMessage,
        ErrorShape::ResponseError,
        ErrorShape::ResponseBody,
        ErrorShape::StatusText,
        ErrorShape::NestedReason,
        ErrorShape::Cause,
        ErrorShape::Reason,
        ErrorShape::Message,
    ];
}

/// Errors that can report detail for some of the [`ErrorShape`]s.
pub trait DescribeError: std::fmt::Debug {
    fn detail(&self, _shape: ErrorShape) -> Option<String> {
        None
    }
}

/// First non-empty detail in [`ErrorShape::ORDER`], or the error's `Debug`
/// rendering when it exposes none.
pub fn describe_error<E: DescribeError + ?Sized>(err: &E) -> String {
    ErrorShape::ORDER
        .iter()
        .filter_map(|shape| err.detail(*shape))
        .find(|text| !text.trim().is_empty())
        .unwrap_or_else(|| format!("{:?}", err))
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including initial attempt)
    pub max_attempts: u32,
    /// Wait before the first retry; zero retries immediately
    pub delay: Duration,
    /// Factor applied to the delay after every retry (1 keeps it fixed)
    pub backoff_multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::ZERO,
            backoff_multiplier: 1,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff_multiplier: 1,
        }
    }

    /// Delay before retry number `attempt` (0-indexed)
    fn get_delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1).saturating_pow(attempt);
        self.delay.saturating_mul(factor)
    }
}

/// Retry an async operation, propagating the last error once retries run out.
///
/// # Example
/// ```ignore
/// let rows = retry_with_backoff("txlist", &RetryConfig::default(), || async {
///     client.fetch(TransactionStream::Normal).await
/// })
/// .await?;
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(
    name: &str,
    config: &RetryConfig,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: DescribeError,
{
    retry_with_backoff_if(name, config, operation, |_| true).await
}

/// Like [`retry_with_backoff`], but errors for which `should_retry` returns
/// false are returned immediately.
pub async fn retry_with_backoff_if<F, Fut, T, E>(
    name: &str,
    config: &RetryConfig,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: DescribeError,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("✅ [{}] succeeded after {} retry attempts", name, attempt);
                }
                return Ok(result);
            }
            Err(e) => {
                let message = describe_error(&e);

                if !should_retry(&e) {
                    error!("❌ [{}] failed with non-retryable error: {}", name, message);
                    return Err(e);
                }

                if attempt >= config.max_attempts {
                    error!(
                        "❌ [{}] failed after {} attempts (max retries exhausted): {}",
                        name,
                        attempt + 1,
                        message
                    );
                    return Err(e);
                }

                let delay = config.get_delay(attempt);
                warn!(
                    "⚠️  [{}] failed (attempt {}/{}): {} - retrying in {}ms",
                    name,
                    attempt + 1,
                    config.max_attempts + 1,
                    message,
                    delay.as_millis()
                );

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                attempt += 1;
            }
        }
    }
}
