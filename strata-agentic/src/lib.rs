#![deny(missing_docs)]
//! The agentic tier — think-act-observe until the goal is met.
//!
//! An explicit loop over a state record: build the request (with or
//! without conversation memory), call the model (or serve queued excess
//! tool calls as a synthetic response), enforce the token budget before
//! committing usage, fan tool calls out in parallel through the
//! registry with per-call validation and approval gating, append the
//! iteration to the trace, and terminate on goal achievement, iteration
//! cap, cancellation, timeout, budget exhaustion, or model error.

pub mod executor;

pub use executor::{
    AgenticConfig, AgenticExecutor, DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_TOOL_CALLS_PER_ITERATION,
    DEFAULT_TIMEOUT_MS,
};
