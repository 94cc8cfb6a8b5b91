#![deny(missing_docs)]
//! Single-shot generative tier.
//!
//! One templated model call: render prompts (few-shot pairs included),
//! dispatch to the provider with retry/backoff, parse the output,
//! validate against the declared schema with same-prompt self-retry,
//! and serve repeat requests from the content-addressed result cache.

pub mod executor;
pub mod parse;
pub mod template;

pub use executor::{GenerativeConfig, GenerativeExecutor, DEFAULT_TIMEOUT_MS, SCHEMA_RETRY_LIMIT};
pub use parse::parse_model_output;
pub use template::render_template;
