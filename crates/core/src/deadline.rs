use std::future::Future;
use std::time::Duration;

use correlation_storage::StoreError;

/// Run a store call under a deadline. An elapsed deadline becomes
/// `StoreError::Timeout`, which callers surface as a retryable failure.
pub(crate) async fn bounded<T, Fut>(
    limit: Duration,
    operation: &'static str,
    call: Fut,
) -> Result<T, StoreError>
where
    Fut: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            let after_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(operation, after_ms, "store call timed out");
            Err(StoreError::Timeout {
                operation: operation.to_string(),
                after_ms,
            })
        }
    }
}

/// Current UTC time as an RFC 3339 string.
pub(crate) fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}
