use crate::scheduler::RetryPolicy;
use anyhow::Error;
use std::future::Future;
use tracing::debug;

/// Retries an async operation according to `policy`
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `policy`: Total attempts and the delay between them
///
/// # Returns
/// Either the successful result or the error from the last attempt
pub async fn with_retry<F, Fut, T, E>(mut operation: F, policy: RetryPolicy) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<Error>,
{
    let mut attempt = 1;
    loop {
        match operation().await.map_err(Into::into) {
            Ok(val) => return Ok(val),
            Err(err) => match policy.delay_after(attempt) {
                Some(delay) => {
                    debug!(
                        "Attempt {}/{} failed: {}. Retrying...",
                        attempt, policy.max_attempts, err
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_with_retry_recovers() {
        let calls = AtomicUsize::new(0);
        let result: Result<usize, Error> = with_retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(anyhow::anyhow!("boom {n}"))
                } else {
                    Ok(n)
                }
            },
            RetryPolicy::fixed(3, Duration::from_millis(1)),
        )
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_with_retry_returns_last_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), Error> = with_retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(anyhow::anyhow!("boom {n}"))
            },
            RetryPolicy::fixed(2, Duration::from_millis(1)),
        )
        .await;
        assert_eq!(result.unwrap_err().to_string(), "boom 2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
