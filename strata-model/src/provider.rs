//! Provider trait and error taxonomy for model backends.
//!
//! The [`Provider`] trait uses RPITIT (return-position `impl Trait` in
//! traits) and is intentionally NOT object-safe. Tier executors are
//! generic over `P: Provider`; the object-safe boundary is the tier
//! executor itself.

use crate::types::{ProviderRequest, ProviderResponse};
use std::future::Future;
use thiserror::Error;
use tier0::DurationMs;

/// Errors from model providers.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP or network request failed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Provider rate-limited the request (HTTP 429).
    #[error("rate limited")]
    RateLimited {
        /// Server-suggested wait, from a `Retry-After` header.
        retry_after: Option<DurationMs>,
    },

    /// Provider-side failure (HTTP 5xx).
    #[error("server error: HTTP {status}: {message}")]
    ServerError {
        /// The HTTP status code.
        status: u16,
        /// Response body or status text.
        message: String,
        /// Server-suggested wait, from a `Retry-After` header.
        retry_after: Option<DurationMs>,
    },

    /// Authentication/authorization failed.
    #[error("auth failed: {0}")]
    AuthFailed(String),

    /// Could not parse the provider's response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The model identifier is not accepted by any configured provider.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// The in-flight call was aborted by timeout or cancellation.
    #[error("aborted: {0}")]
    Aborted(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Whether retrying this request might succeed: rate limits and
    /// 5xx-class failures are retryable, everything else bubbles.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. } | ProviderError::ServerError { .. }
        )
    }

    /// Server-suggested retry delay, when one was sent.
    pub fn retry_after(&self) -> Option<DurationMs> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            ProviderError::ServerError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Model provider interface.
///
/// Each provider (Claude, GPT) implements this trait. This trait uses
/// RPITIT and is NOT object-safe — tier executors are generic over
/// `P: Provider`.
pub trait Provider: Send + Sync {
    /// Send a completion request to the provider.
    fn complete(
        &self,
        request: ProviderRequest,
    ) -> impl Future<Output = Result<ProviderResponse, ProviderError>> + Send;
}
