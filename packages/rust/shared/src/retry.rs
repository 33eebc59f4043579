//! Bounded retry with exponential backoff and jitter for transient
//! filesystem errors.
//!
//! - [`backoff_delay`]: `min(max_delay, base * 2^attempt)` scaled by ±jitter
//! - [`retry_io`]: blocking retry loop (worker threads)
//! - [`retry_io_async`]: async retry loop (tokio tasks)
//!
//! Non-transient errors fail immediately as [`NotefoldError::Io`]; transient
//! errors that outlast the budget become [`NotefoldError::RetryExhausted`].

use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::config::RetryConfig;
use crate::error::{NotefoldError, Result};

/// Whether an I/O error is worth retrying.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ResourceBusy
    )
}

/// Delay before retry number `attempt` (zero-based).
///
/// `random` must be in `[0.0, 1.0)`; it spreads the delay symmetrically by
/// `jitter_factor` around the capped exponential value.
pub fn backoff_delay(config: &RetryConfig, attempt: u32, random: f64) -> Duration {
    let exponential = config
        .base_delay_ms
        .saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(config.max_delay_ms) as f64;

    let jitter = config.jitter_factor.clamp(0.0, 1.0);
    let scale = 1.0 + jitter * (2.0 * random.clamp(0.0, 1.0) - 1.0);
    Duration::from_millis((capped * scale).round().max(0.0) as u64)
}

fn next_delay(config: &RetryConfig, attempt: u32) -> Duration {
    backoff_delay(config, attempt, rand::random::<f64>())
}

/// Run a blocking filesystem operation with retries.
pub fn retry_io<T>(
    config: &RetryConfig,
    operation: &str,
    path: &Path,
    mut f: impl FnMut() -> io::Result<T>,
) -> Result<T> {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(NotefoldError::RetryExhausted {
                        operation: operation.to_string(),
                        path: path.to_path_buf(),
                        attempts: attempt,
                        source: err,
                    });
                }
                let delay = next_delay(config, attempt - 1);
                debug!(operation, path = %path.display(), attempt, delay_ms = delay.as_millis() as u64, error = %err, "transient I/O error, retrying");
                std::thread::sleep(delay);
            }
            Err(err) => return Err(NotefoldError::io(path, err)),
        }
    }
}

/// Async variant of [`retry_io`] that sleeps on the tokio timer.
pub async fn retry_io_async<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    path: &Path,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(NotefoldError::RetryExhausted {
                        operation: operation.to_string(),
                        path: path.to_path_buf(),
                        attempts: attempt,
                        source: err,
                    });
                }
                let delay = next_delay(config, attempt - 1);
                debug!(operation, path = %path.display(), attempt, delay_ms = delay.as_millis() as u64, error = %err, "transient I/O error, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(NotefoldError::io(path, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 4,
            jitter_factor: 0.2,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            jitter_factor: 0.0,
        };
        assert_eq!(backoff_delay(&config, 0, 0.5), Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 2, 0.5), Duration::from_millis(400));
        assert_eq!(backoff_delay(&config, 10, 0.5), Duration::from_millis(1000));
    }

    #[test]
    fn backoff_jitter_is_symmetric() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            jitter_factor: 0.2,
        };
        assert_eq!(backoff_delay(&config, 0, 0.0), Duration::from_millis(80));
        assert_eq!(backoff_delay(&config, 0, 0.5), Duration::from_millis(100));
        assert!(backoff_delay(&config, 0, 0.999) <= Duration::from_millis(120));
    }

    #[test]
    fn retry_succeeds_after_transient_failures() {
        let mut calls = 0;
        let result = retry_io(&fast_config(), "read", Path::new("x"), || {
            calls += 1;
            if calls < 3 {
                Err(io::Error::new(io::ErrorKind::Interrupted, "again"))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_exhaustion_is_typed() {
        let result: Result<()> = retry_io(&fast_config(), "write", Path::new("out.md"), || {
            Err(io::Error::new(io::ErrorKind::TimedOut, "busy"))
        });
        match result {
            Err(NotefoldError::RetryExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[test]
    fn permanent_errors_fail_fast() {
        let mut calls = 0;
        let result: Result<()> = retry_io(&fast_config(), "read", Path::new("missing"), || {
            calls += 1;
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"))
        });
        assert!(matches!(result, Err(NotefoldError::Io { .. })));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn async_retry_recovers() {
        let mut calls = 0;
        let result = retry_io_async(&fast_config(), "write", Path::new("x"), || {
            calls += 1;
            let outcome = if calls == 1 {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "later"))
            } else {
                Ok("done")
            };
            async move { outcome }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
    }
}
