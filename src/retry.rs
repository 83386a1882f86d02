use crate::error::Error;
use std::{future::Future, time::Duration};
use tracing::warn;

/// Fixed-attempt, fixed-delay retry schedule for upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 5, delay: Duration::from_secs(5) }
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent.
pub(crate) async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.attempts => {
                warn!(%err, attempt, "transient failure, retrying");
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    fn transient() -> Error {
        Error::Api { endpoint: "test".to_string(), status: StatusCode::INTERNAL_SERVER_ERROR }
    }

    #[tokio::test]
    async fn recovers_from_transient_failures() {
        let policy = RetryPolicy { attempts: 3, delay: Duration::ZERO };
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result = retry(&policy, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_the_attempt_budget() {
        let policy = RetryPolicy { attempts: 2, delay: Duration::ZERO };
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<u64, Error> = retry(&policy, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fails_fast_on_non_transient_errors() {
        let policy = RetryPolicy { attempts: 5, delay: Duration::ZERO };
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<u64, Error> = retry(&policy, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Api { endpoint: "test".to_string(), status: StatusCode::NOT_FOUND })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
