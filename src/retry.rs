//! Retry logic with a fixed delay
//!
//! Asset transfers are retried a bounded number of times, sleeping a constant
//! delay between attempts. Every failed transfer is retried; only errors that
//! cannot change between attempts end the loop early.
//!
//! # Example
//!
//! ```no_run
//! use chapter_dl::retry::{IsRetryable, download_with_retry};
//! use chapter_dl::config::RetryPolicy;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let policy = RetryPolicy::default();
//! download_with_retry(&policy, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryPolicy;
use crate::error::Error;
use std::future::Future;

/// Trait for errors that can be classified as retryable or not
///
/// A failed transfer attempt (network error, bad status, interrupted body, write
/// failure) should return `true`: a later attempt may still succeed. Errors that
/// no later attempt can change (an invalid destination path, shutdown) should
/// return `false`.
pub trait IsRetryable {
    /// Returns true if another attempt of the operation may succeed
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Builder errors mean the request itself is malformed
            Error::Network(e) => !e.is_builder(),
            Error::Transfer { .. } | Error::HttpStatus { .. } | Error::Io(_) => true,
            Error::Config { .. }
            | Error::Archive(_)
            | Error::Image(_)
            | Error::Serialization(_)
            | Error::Context(_)
            | Error::AuxiliaryContext(_)
            | Error::Abandoned(_)
            | Error::InvalidPath { .. }
            | Error::NotFound(_)
            | Error::ShuttingDown
            | Error::Watch(_) => false,
        }
    }
}

/// Execute an async operation, retrying transient failures with a fixed delay
///
/// The operation runs at most `policy.attempts + 1` times. Between attempts the
/// task sleeps `policy.delay`. Non-retryable errors are returned immediately;
/// after exhaustion the last error is returned.
pub async fn download_with_retry<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut remaining = policy.attempts;
    let mut attempt: u32 = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "transfer succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && remaining > 0 => {
                remaining -= 1;
                tracing::warn!(
                    error = %e,
                    attempt,
                    remaining,
                    delay_ms = policy.delay.as_millis() as u64,
                    "transfer failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(error = %e, attempts = attempt, "transfer failed, attempts exhausted");
                } else {
                    tracing::warn!(error = %e, "transfer failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}
