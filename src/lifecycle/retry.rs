//! Explicit retry policy for venue calls.
//!
//! Connection-class failures get exactly one immediate retry; anything else,
//! or a second consecutive transient failure, escalates to the caller with
//! the retry count spent. Every venue call is bounded by a timeout, and a
//! timeout classifies as transient.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{BrokerError, Result};

/// Fixed retry budget: one immediate retry on a transient failure.
pub const MAX_TRANSIENT_RETRIES: u8 = 1;

/// Successful call plus the number of transient retries it consumed.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub retries: u8,
}

/// Failed call: the final error plus the retries spent before giving up.
#[derive(Debug)]
pub struct RetryFailure {
    pub error: BrokerError,
    pub retries: u8,
}

impl std::fmt::Display for RetryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} retry)", self.error, self.retries)
    }
}

/// Run a venue call under the fixed retry budget.
pub async fn with_retry<T, F, Fut>(
    operation: &str,
    mut call: F,
) -> std::result::Result<RetryOutcome<T>, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0u8;
    loop {
        match call().await {
            Ok(value) => return Ok(RetryOutcome { value, retries }),
            Err(error) if error.is_transient() && retries < MAX_TRANSIENT_RETRIES => {
                warn!("{} failed transiently ({}), retrying", operation, error);
                retries += 1;
            }
            Err(error) => return Err(RetryFailure { error, retries }),
        }
    }
}

/// Bound one venue call with a timeout; elapsed maps to the transient
/// [`BrokerError::VenueTimeout`].
pub async fn with_timeout<T>(
    operation: &str,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(BrokerError::VenueTimeout {
            operation: operation.to_string(),
            elapsed_ms: timeout.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU8, Ordering};

    #[tokio::test]
    async fn success_spends_no_retries() {
        let outcome = with_retry("op", || async { Ok::<_, BrokerError>(7) })
            .await
            .expect("success");
        assert_eq!(outcome.value, 7);
        assert_eq!(outcome.retries, 0);
    }

    #[tokio::test]
    async fn transient_then_success_spends_one_retry() {
        let calls = AtomicU8::new(0);
        let outcome = with_retry("op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(BrokerError::VenueConnection("reset".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .expect("retried success");
        assert_eq!(outcome.value, 7);
        assert_eq!(outcome.retries, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_transient_failure_escalates() {
        let calls = AtomicU8::new(0);
        let failure = with_retry("op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<u8, _>(BrokerError::VenueConnection("reset".into())) }
        })
        .await
        .expect_err("exhausted");
        assert_eq!(failure.retries, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(failure.error.is_transient());
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let calls = AtomicU8::new(0);
        let failure = with_retry("op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<u8, _>(BrokerError::VenueRejected("bad symbol".into())) }
        })
        .await
        .expect_err("rejected");
        assert_eq!(failure.retries, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_maps_to_transient_error() {
        let err = with_timeout("submit", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, BrokerError>(())
        })
        .await
        .expect_err("times out");
        assert!(err.is_transient());
    }
}
