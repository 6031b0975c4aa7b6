//! Async retry utilities with exponential backoff

use std::future::Future;
use std::time::Duration;

/// Default maximum retry attempts for storage operations
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay in milliseconds for exponential backoff
pub const DEFAULT_BASE_DELAY_MS: u64 = 100;

/// Retry an async operation with exponential backoff.
///
/// Returns the operation's value on success, or the last error together
/// with the number of attempts made.
pub async fn retry_with_backoff<F, Fut, T, E>(
    max_attempts: u32,
    base_delay_ms: u64,
    mut operation: F,
) -> Result<T, (E, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempts >= max_attempts {
                    return Err((e, attempts));
                }
                let delay = Duration::from_millis(base_delay_ms * 2_u64.pow(attempts - 1));
                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[tokio::test]
    async fn success_on_first_try() {
        let result = retry_with_backoff(3, 1, || async { Ok::<_, &str>(42) }).await;
        assert_eq!(result.ok(), Some(42));
    }

    #[tokio::test]
    async fn success_after_retry() {
        let attempts = RefCell::new(0);
        let result = retry_with_backoff(3, 1, || {
            *attempts.borrow_mut() += 1;
            let n = *attempts.borrow();
            async move {
                if n < 2 { Err("transient error") } else { Ok(n) }
            }
        })
        .await;
        assert_eq!(result.ok(), Some(2));
    }

    #[tokio::test]
    async fn failure_after_max_retries() {
        let result =
            retry_with_backoff(3, 1, || async { Err::<(), _>("persistent error") }).await;
        let (error, attempts) = result.unwrap_err();
        assert_eq!(error, "persistent error");
        assert_eq!(attempts, 3);
    }
}
