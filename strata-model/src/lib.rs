#![deny(missing_docs)]
//! Provider contracts for the generative and agentic tiers.
//!
//! Defines the internal conversation types, the [`Provider`] trait
//! (RPITIT, not object-safe), the model catalog with short-name
//! mapping and pricing, the family-dispatching [`ProviderRouter`], and
//! the retry/backoff discipline for provider-level failures.

pub mod catalog;
pub mod provider;
pub mod retry;
pub mod router;
pub mod types;

pub use catalog::{estimate_cost, resolve_model, ModelFamily, ResolvedModel, DEFAULT_MODEL};
pub use provider::{Provider, ProviderError};
pub use retry::{backoff_delay, call_with_retry, parse_retry_after, RetriedCall, DEFAULT_MAX_ATTEMPTS};
pub use router::ProviderRouter;
pub use types::{
    ContentPart, ProviderMessage, ProviderRequest, ProviderResponse, Role, StopReason, ToolSchema,
};
