//! Exponential backoff and caller-side requeue of rate-limited requests

use std::time::Duration;

use crate::error::FetchError;
use crate::shutdown::ShutdownToken;

/// Exponential backoff: `base * 2^attempt`
pub fn backoff_duration(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Re-issue a request that came back [`FetchError::RateLimited`].
///
/// The client never retries 429s itself. Each requeue passes through the
/// breaker pre-flight again, so a trip in the meantime makes it wait out
/// the pause at reduced concurrency.
pub fn requeue_rate_limited<T>(
    label: &str,
    requeues: u32,
    backoff_base: Duration,
    token: &ShutdownToken,
    mut attempt_fn: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Err(FetchError::RateLimited) if attempt < requeues => {
                attempt += 1;
                log::debug!("{label}: rate limited, requeue {attempt}/{requeues}");
                token.sleep(backoff_duration(backoff_base, attempt))?;
            }
            other => return other,
        }
    }
}
