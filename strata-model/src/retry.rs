//! Retry discipline for provider calls.
//!
//! Retryable failures (rate limits, 5xx) are retried up to the policy's
//! attempt count. The server's `Retry-After` is honored when present;
//! otherwise exponential backoff with base 1 s, capped at 60 s.
//! Non-retryable errors bubble after the first attempt.

use crate::provider::{Provider, ProviderError};
use crate::types::{ProviderRequest, ProviderResponse};
use chrono::{DateTime, Utc};
use tier0::DurationMs;
use tracing::warn;

/// Default attempt count when the definition carries no retry policy.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Backoff base, in milliseconds.
const BACKOFF_BASE_MS: u64 = 1_000;
/// Backoff cap, in milliseconds.
const BACKOFF_CAP_MS: u64 = 60_000;

/// Parse a `Retry-After` header value: either delay-seconds or an HTTP
/// date.
pub fn parse_retry_after(value: &str) -> Option<DurationMs> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(DurationMs::from_secs(seconds));
    }
    let date = DateTime::parse_from_rfc2822(trimmed).ok()?;
    let delta = date.with_timezone(&Utc) - Utc::now();
    let millis = delta.num_milliseconds();
    if millis <= 0 {
        Some(DurationMs::ZERO)
    } else {
        Some(DurationMs::from_millis(millis as u64))
    }
}

/// Backoff delay before retry number `retry` (1-based): the server's
/// suggestion when present, else `base * 2^(retry-1)` capped.
pub fn backoff_delay(retry: u32, suggested: Option<DurationMs>) -> DurationMs {
    if let Some(suggested) = suggested {
        return suggested;
    }
    let exp = retry.saturating_sub(1).min(16);
    let ms = BACKOFF_BASE_MS.saturating_mul(1u64 << exp).min(BACKOFF_CAP_MS);
    DurationMs::from_millis(ms)
}

/// Outcome of a retried provider call.
pub struct RetriedCall {
    /// The successful response.
    pub response: ProviderResponse,
    /// Retries performed (0 = first attempt succeeded).
    pub retry_count: u32,
}

/// Call the provider with retries per the policy.
pub async fn call_with_retry<P: Provider>(
    provider: &P,
    request: &ProviderRequest,
    max_attempts: u32,
) -> Result<RetriedCall, ProviderError> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match provider.complete(request.clone()).await {
            Ok(response) => {
                return Ok(RetriedCall {
                    response,
                    retry_count: attempt - 1,
                })
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = backoff_delay(attempt, e.retry_after());
                warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "provider call failed, retrying"
                );
                tokio::time::sleep(delay.to_std()).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StopReason;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tier0::TokenUsage;

    struct FlakyProvider {
        responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        calls: AtomicUsize,
    }

    impl FlakyProvider {
        fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Provider for FlakyProvider {
        fn complete(
            &self,
            _request: ProviderRequest,
        ) -> impl std::future::Future<Output = Result<ProviderResponse, ProviderError>> + Send
        {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("FlakyProvider: no more responses queued");
            async move { next }
        }
    }

    fn ok_response() -> ProviderResponse {
        ProviderResponse {
            content: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::new(1, 1),
            model: "mock".into(),
        }
    }

    #[test]
    fn parses_retry_after_seconds() {
        assert_eq!(
            parse_retry_after("2"),
            Some(DurationMs::from_secs(2))
        );
    }

    #[test]
    fn parses_retry_after_http_date() {
        let future = (Utc::now() + chrono::Duration::seconds(30)).to_rfc2822();
        let parsed = parse_retry_after(&future).unwrap();
        assert!(parsed.as_millis() > 25_000 && parsed.as_millis() <= 30_500);
    }

    #[test]
    fn past_http_date_is_zero() {
        let past = (Utc::now() - chrono::Duration::seconds(30)).to_rfc2822();
        assert_eq!(parse_retry_after(&past), Some(DurationMs::ZERO));
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        assert_eq!(backoff_delay(1, None).as_millis(), 1_000);
        assert_eq!(backoff_delay(2, None).as_millis(), 2_000);
        assert_eq!(backoff_delay(3, None).as_millis(), 4_000);
        assert_eq!(backoff_delay(10, None).as_millis(), 60_000);
        assert_eq!(
            backoff_delay(3, Some(DurationMs::from_secs(7))).as_millis(),
            7_000
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limit_then_succeeds() {
        let provider = FlakyProvider::new(vec![
            Err(ProviderError::RateLimited { retry_after: None }),
            Ok(ok_response()),
        ]);
        let out = call_with_retry(&provider, &ProviderRequest::default(), 3)
            .await
            .unwrap();
        assert_eq!(out.retry_count, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_bubbles_immediately() {
        let provider = FlakyProvider::new(vec![Err(ProviderError::AuthFailed("nope".into()))]);
        let err = call_with_retry(&provider, &ProviderRequest::default(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AuthFailed(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_bubble_last_error() {
        let provider = FlakyProvider::new(vec![
            Err(ProviderError::RateLimited { retry_after: None }),
            Err(ProviderError::RateLimited { retry_after: None }),
            Err(ProviderError::RateLimited { retry_after: None }),
        ]);
        let err = call_with_retry(&provider, &ProviderRequest::default(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }
}
