//! Bounded retry with exponential backoff
//!
//! Wraps remote calls at the orchestrator boundary. The mirror core never
//! retries on its own; it only sees the final result of [`with_retry`].

use crate::config::RetryConfig;
use anyhow::Result;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Error returned when the run was cancelled while waiting on a remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// True when any error in the chain is a [`Cancelled`]
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<Cancelled>())
}

/// Classify an error as transient
///
/// Timeouts, connection failures, 5xx and 429 responses and dropped
/// connections are retried. Everything else (4xx, decode errors, local
/// I/O) is permanent.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    if is_cancelled(err) {
        return false;
    }

    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            if e.is_timeout() || e.is_connect() {
                return true;
            }
            if let Some(status) = e.status() {
                return status.is_server_error() || status.as_u16() == 429;
            }
            return e.is_request() || e.is_body();
        }
        if cause.is::<tokio::time::error::Elapsed>() {
            return true;
        }
        if let Some(e) = cause.downcast_ref::<std::io::Error>() {
            return matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            );
        }
    }

    false
}

/// Run `operation` until it succeeds, fails permanently or retries run out
///
/// Cancellation interrupts both the running attempt and the backoff sleep.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    what: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay();

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            result = operation() => result,
        };

        match result {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "{} succeeded after retry", what);
                }
                return Ok(value);
            }
            Err(e) if attempt < config.max_attempts && is_retryable(&e) => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "{} failed, retrying",
                    what
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(Cancelled.into()),
                    _ = tokio::time::sleep(delay) => {}
                }

                let next = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next.min(config.max_delay());
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        }
    }

    fn transient() -> anyhow::Error {
        anyhow::Error::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ))
        .context("Failed to fetch files page 2")
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result = with_retry(&fast_config(3), &cancel, "list files", || async move {
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
    async fn test_retries_are_bounded() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<()> = with_retry(&fast_config(2), &cancel, "download", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_fast() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<()> = with_retry(&fast_config(5), &cancel, "resolve", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("missing field `display_name`"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<()> = with_retry(&fast_config(3), &cancel, "list pages", || async {
            std::future::pending::<Result<()>>().await
        })
        .await;

        let err = result.unwrap_err();
        assert!(is_cancelled(&err));
        assert!(!is_retryable(&err));
    }

    #[test]
    fn test_classification() {
        assert!(is_retryable(&transient()));
        assert!(!is_retryable(&anyhow!("404 Not Found")));

        let disk_full = anyhow::Error::new(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        ));
        assert!(!is_retryable(&disk_full));
    }
}
