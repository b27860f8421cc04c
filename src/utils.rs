//! Small shared helpers: transport retry, truncation, DNI validation.

use anyhow::Result;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;

/// Retry a Telegram transport operation with exponential backoff.
///
/// Designed for transient network failures while talking to Telegram
/// (send, history fetch, media download). The strategy uses exponential
/// backoff with jitter to avoid thundering herd:
/// - Initial delay: 500ms
/// - Max delay: 4s
/// - Max attempts: 3 (constants in `config.rs`)
///
/// # Errors
///
/// Returns the last error once all attempts are exhausted.
pub async fn retry_transport_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::{
        TRANSPORT_INITIAL_BACKOFF_MS, TRANSPORT_MAX_BACKOFF_MS, TRANSPORT_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TRANSPORT_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TRANSPORT_MAX_BACKOFF_MS))
        .map(jitter) // Add jitter to prevent thundering herd
        .take(TRANSPORT_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram transport operation failed after {} attempts: {}",
            TRANSPORT_MAX_RETRIES, e
        );
        e
    })
}

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use dnit_gateway::utils::truncate_str;
/// let s = "ATENCIÓN: espera";
/// assert_eq!(truncate_str(s, 8), "ATENCIÓN");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Checks that a DNI has the expected shape: exactly 8 ASCII digits.
#[must_use]
pub fn is_valid_dni(dni: &str) -> bool {
    dni.len() == 8 && dni.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_unicode() {
        let s = "ATENCIÓN por favor";
        assert_eq!(truncate_str(s, 8), "ATENCIÓN");
        assert_eq!(truncate_str(s, 50), "ATENCIÓN por favor");
    }

    #[test]
    fn test_is_valid_dni() {
        assert!(is_valid_dni("12345678"));
        assert!(!is_valid_dni("1234567"));
        assert!(!is_valid_dni("123456789"));
        assert!(!is_valid_dni("1234567a"));
        assert!(!is_valid_dni("１２３４５６７８")); // full-width digits are not ASCII
        assert!(!is_valid_dni(""));
    }

    #[tokio::test]
    async fn test_retry_eventually_succeeds() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let attempts = AtomicU32::new(0);

        let result = retry_transport_operation(|| async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow::anyhow!("transient"))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.ok(), Some(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
