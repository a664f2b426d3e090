//! Retry with exponential backoff and jitter
//!
//! The transfer engine never retries on its own. Callers wrap a whole
//! transfer (or any other client call) in [`retry_with_backoff`] when they
//! want transient failures and incomplete copies to be attempted again.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Retry a fallible async operation with exponential backoff
///
/// # Arguments
/// * `config` - Retry configuration
/// * `operation` - Async closure that returns `Result<T>`
/// * `is_retryable` - Closure that determines if an error should trigger retry
///
/// # Example
/// ```ignore
/// let outcome = retry_with_backoff(
///     &config.retry,
///     || engine.copy(source.as_ref(), "in.bin", destination.as_ref(), "out.bin"),
///     is_retryable_error,
/// ).await?;
/// ```
pub async fn retry_with_backoff<T, F, Fut, R>(
    config: &RetryConfig,
    mut operation: F,
    is_retryable: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    R: Fn(&Error) -> bool,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= config.max_attempts || !is_retryable(&e) {
                    return Err(e);
                }

                let backoff = calculate_backoff(config, attempt);
                tracing::debug!(
                    attempt = attempt,
                    backoff_ms = backoff.as_millis(),
                    error = %e,
                    "Retrying after transient error"
                );

                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Calculate backoff duration with jitter
fn calculate_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    // Exponential backoff: initial * 2^(attempt-1), saturating at u64::MAX
    let base_ms = config
        .initial_backoff_ms
        .saturating_mul(1u64 << attempt.saturating_sub(1).min(10));
    let capped_ms = base_ms.min(config.max_backoff_ms);

    // Add jitter: random value between 0 and backoff
    let jitter_ms = rand_jitter(capped_ms);
    Duration::from_millis(capped_ms.saturating_add(jitter_ms))
}

/// Generate pseudo-random jitter without external RNG dependency
fn rand_jitter(max: u64) -> u64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    nanos % max.max(1)
}

/// Check if an error is worth another attempt
///
/// Transient network and I/O failures qualify, and so does an incomplete
/// copy since the next attempt starts the stream from scratch. Anything
/// rooted in configuration, credentials or data format does not.
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Network(msg) => {
            let msg_lower = msg.to_lowercase();
            msg_lower.contains("timeout")
                || msg_lower.contains("timed out")
                || msg_lower.contains("connection reset")
                || msg_lower.contains("connection refused")
                || msg_lower.contains("dispatch failure")
                || msg_lower.contains("503")
                || msg_lower.contains("service unavailable")
                || msg_lower.contains("too many requests")
                || msg_lower.contains("429")
                || msg_lower.contains("slow down")
        }
        Error::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::UnexpectedEof
        ),
        Error::IncompleteCopy { .. } => true,
        Error::Config(_)
        | Error::InvalidDescriptor(_)
        | Error::UnsupportedScheme(_)
        | Error::NotDecrypted(_)
        | Error::InvalidKey(_)
        | Error::InvalidEnvelope(_)
        | Error::Decryption(_)
        | Error::Encryption(_)
        | Error::Auth(_)
        | Error::NotFound(_)
        | Error::InvalidPath(_)
        | Error::Cancelled { .. }
        | Error::DeleteVerification { .. }
        | Error::UnsupportedFeature(_) => false,
        Error::General(msg) => {
            let msg_lower = msg.to_lowercase();
            msg_lower.contains("timeout") || msg_lower.contains("temporary")
        }
        Error::Json(_) | Error::TomlParse(_) | Error::TomlSerialize(_) => false,
    }
}
