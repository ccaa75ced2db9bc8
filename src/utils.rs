//! Small helpers shared by the bot layers: Telegram retry and caption truncation.

use std::future::Future;
use std::time::Duration;
use teloxide::RequestError;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

/// Suffix appended to text cut at a length limit
pub const ELLIPSIS: &str = "...";

/// Length of a string in UTF-16 code units, the unit Telegram counts limits in.
#[must_use]
pub fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

/// Truncates `s` so that it fits in `limit` UTF-16 code units.
///
/// Text that already fits is returned unchanged. Longer text is cut on a
/// character boundary and suffixed with `"..."`, the suffix counting towards
/// the limit.
///
/// # Examples
///
/// ```
/// use kino_search_bot::utils::truncate_utf16;
/// assert_eq!(truncate_utf16("Привет, мир!", 9), "Привет...");
/// assert_eq!(truncate_utf16("short", 10), "short");
/// ```
#[must_use]
pub fn truncate_utf16(s: &str, limit: usize) -> String {
    if utf16_len(s) <= limit {
        return s.to_string();
    }

    let budget = limit.saturating_sub(ELLIPSIS.len());
    let mut used = 0;
    let mut end = 0;
    for (idx, ch) in s.char_indices() {
        let width = ch.len_utf16();
        if used + width > budget {
            break;
        }
        used += width;
        end = idx + ch.len_utf8();
    }

    let mut out = String::with_capacity(end + ELLIPSIS.len());
    out.push_str(&s[..end]);
    out.push_str(ELLIPSIS);
    out
}

/// Whether a failed Telegram call may succeed when repeated.
///
/// Network and I/O failures and flood control are transient. API errors
/// such as a blocked bot or malformed markup are not.
#[must_use]
pub const fn is_transient(error: &RequestError) -> bool {
    matches!(
        error,
        RequestError::Network(_) | RequestError::Io(_) | RequestError::RetryAfter(_)
    )
}

/// Retry a Telegram API operation with exponential backoff.
///
/// Only [`is_transient`] errors are retried. Backoff starts at 500ms, is
/// capped at 4s and gives up after `TELEGRAM_API_MAX_RETRIES` attempts.
/// Jitter avoids synchronized retries. On `RetryAfter` the requested wait is
/// slept before the next attempt.
///
/// # Errors
///
/// Returns the first permanent error, or the last error once every attempt
/// failed.
pub async fn retry_telegram_operation<F, Fut, T>(mut operation: F) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    let attempt = || {
        let call = operation();
        async move {
            let result = call.await;
            if let Err(RequestError::RetryAfter(wait)) = &result {
                warn!(wait = %wait, "Telegram flood control, waiting before retry");
                tokio::time::sleep(wait.duration()).await;
            }
            result
        }
    };

    RetryIf::spawn(retry_strategy, attempt, is_transient)
        .await
        .map_err(|e| {
            if is_transient(&e) {
                warn!(
                    "Telegram API operation failed after {} attempts: {}",
                    TELEGRAM_API_MAX_RETRIES, e
                );
            }
            e
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use teloxide::types::Seconds;
    use teloxide::ApiError;

    #[test]
    fn test_truncate_keeps_short_text() {
        assert_eq!(truncate_utf16("Матрица", 1024), "Матрица");
    }

    #[test]
    fn test_truncate_exact_limit() {
        let text = "a".repeat(2000);
        let cut = truncate_utf16(&text, 1024);
        assert_eq!(utf16_len(&cut), 1024);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_truncate_cyrillic_counts_code_units() {
        // Cyrillic letters are one UTF-16 unit but two UTF-8 bytes
        let text = "ж".repeat(1500);
        let cut = truncate_utf16(&text, 1024);
        assert_eq!(utf16_len(&cut), 1024);
        assert_eq!(cut.chars().filter(|c| *c == 'ж').count(), 1021);
    }

    #[test]
    fn test_truncate_does_not_split_surrogate_pairs() {
        let text = "🎬".repeat(600);
        let cut = truncate_utf16(&text, 1024);
        assert!(utf16_len(&cut) <= 1024);
        assert!(cut.trim_end_matches("...").chars().all(|c| c == '🎬'));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_flood_control() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let result = retry_telegram_operation(move || async move {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RequestError::RetryAfter(Seconds::from_seconds(0)))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.ok(), Some(42));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let result: Result<(), _> = retry_telegram_operation(move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(RequestError::Api(ApiError::BotBlocked))
        })
        .await;

        assert!(matches!(result, Err(RequestError::Api(ApiError::BotBlocked))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&RequestError::RetryAfter(Seconds::from_seconds(3))));
        assert!(!is_transient(&RequestError::Api(ApiError::MessageNotModified)));
    }
}
