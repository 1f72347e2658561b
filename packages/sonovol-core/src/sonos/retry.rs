//! Retry logic for transient SOAP errors.
//!
//! Only idempotent reads go through here; writes are sent once and the
//! caller decides what to do with a failure.

use std::time::Duration;

use super::soap::{SoapError, SoapResult};

/// Backoff delays between attempts.
const RETRY_DELAYS_MS: [u64; 3] = [200, 500, 1000];

/// Runs `operation`, retrying on transient faults and timeouts with backoff
/// (200ms, 500ms, 1000ms).
///
/// # Arguments
/// * `action` - Action name for logging
/// * `operation` - Closure that performs the request
pub(crate) async fn with_retry<T, F, Fut>(action: &str, mut operation: F) -> SoapResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = SoapResult<T>>,
{
    let mut last_error: Option<SoapError> = None;
    for (attempt, &delay_ms) in std::iter::once(&0)
        .chain(RETRY_DELAYS_MS.iter())
        .enumerate()
    {
        if attempt > 0 {
            log::info!(
                "[Sonos] Retrying {} (attempt {}/{}) after {}ms",
                action,
                attempt + 1,
                RETRY_DELAYS_MS.len() + 1,
                delay_ms
            );
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        match operation().await {
            Ok(r) => return Ok(r),
            Err(e) if e.is_transient() => {
                log::warn!("[Sonos] {} transient error: {}", action, e);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| SoapError::Parse(format!("{} exhausted retries", action))))
}
