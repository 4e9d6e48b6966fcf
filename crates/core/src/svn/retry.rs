//! Retry wrapper for transient SVN errors.
//!
//! Exponential backoff starting at 10 seconds, at most 3 attempts,
//! reraising the last error unchanged once attempts are exhausted.

use std::future::Future;

use tracing::warn;

use crate::errors::SvnError;

pub const WAIT_EXP_BASE_SECS: u64 = 10;
pub const MAX_ATTEMPTS: u32 = 3;

/// Run `op` up to [`MAX_ATTEMPTS`] times, sleeping `WAIT_EXP_BASE_SECS^attempt`
/// seconds between attempts, as long as the error is classified retryable
/// by [`SvnError::is_retryable`]. The first non-retryable error, or the
/// last error after all attempts are exhausted, is returned as-is.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, SvnError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SvnError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < MAX_ATTEMPTS && e.is_retryable() => {
                let wait = WAIT_EXP_BASE_SECS.pow(attempt);
                warn!(attempt, wait_secs = wait, error = %e, "retrying after transient svn error");
                tokio::time::sleep(std::time::Duration::from_secs(wait)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
