use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::DbError;

const MAX_READ_ATTEMPTS: u32 = 3;

/// Bounded retry with linear backoff for read-only storage calls.
///
/// Write paths must not go through here: blindly resubmitting an insert
/// risks double submission when the first attempt actually landed.
pub async fn with_read_retry<T, F, Fut>(mut op: F) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < MAX_READ_ATTEMPTS => {
                warn!("Transient storage error (attempt {}/{}): {}", attempt, MAX_READ_ATTEMPTS, e);
                tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, DbError> = with_read_retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(DbError::Api { status: 503, message: "unavailable".into() })
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_conflicts() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, DbError> = with_read_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DbError::Conflict("overlap".into())) }
        })
        .await;

        assert!(matches!(result, Err(DbError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, DbError> = with_read_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DbError::Api { status: 500, message: "boom".into() }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_READ_ATTEMPTS);
    }
}
