//! # tier0 — Protocol types and traits for multi-tier function execution
//!
//! This crate defines the shared vocabulary of the strata platform: the
//! function definition model, the uniform execution result, the stable
//! error taxonomy, and the protocol traits that the execution tiers and
//! their collaborators implement.
//!
//! ## The Tiers
//!
//! | Tier | What it runs |
//! |------|--------------|
//! | Code | deterministic user code in an isolation backend |
//! | Generative | a single templated model call |
//! | Agentic | a think-act-observe loop with tools |
//! | Human | approval collection (external surface, contract only) |
//!
//! ## The Protocols
//!
//! | Trait | What it does |
//! |-------|--------------|
//! | [`Sandbox`] | run one compiled artifact under policy + deadline |
//! | [`KvStore`] / [`ObjectStore`] | read-only key→bytes collaborators |
//! | [`EdgeCache`] | best-effort TTL-bounded shared cache |
//! | [`WorkerLoader`] | provision an isolated worker from a binary module |
//!
//! ## Design Principle
//!
//! Every trait is operation-defined, not mechanism-defined.
//! [`Sandbox::run`] means "cause this artifact to execute once under
//! this policy" — not "spin up V8" or "instantiate wasm." That is what
//! makes backends swappable: an embedded JS engine, a wasm store, and a
//! backend that does not exist yet all implement the same trait.
//!
//! ## Dependency Notes
//!
//! This crate depends on `serde_json::Value` for open-ended data fields
//! (function input/output, tool inputs, schemas). JSON is the platform's
//! interchange format; results must serialize losslessly to the wire
//! shape consumed by callers.

#![deny(missing_docs)]

pub mod context;
pub mod definition;
pub mod duration;
pub mod error;
pub mod hash;
pub mod id;
pub mod result;
pub mod sandbox;
pub mod store;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-exports for convenience
pub use context::ExecutionContext;
pub use definition::{
    AgenticFunction, CodeFunction, CodeSource, FunctionDefinition, GenerativeFunction,
    HumanFunction, IsolateType, Language, PromptExample, RetryPolicy, RuntimePolicy,
    SandboxConfig, TierSpec, ToolDefinition,
};
pub use duration::{parse_duration, DurationMs, DurationSpec};
pub use error::{EngineError, ErrorKind};
pub use hash::content_hash;
pub use id::{ExecutionId, FunctionId, WorkerId};
pub use result::{
    json_size_bytes, AgentIteration, AgenticExecution, ApprovalRecord, CodeExecution,
    ExecutionMetadata, ExecutionMetrics, ExecutionStatus, FunctionResult, GenerativeExecution,
    PromptRecord, SerializedError, TierExecution, TokenUsage, ToolCallRecord,
};
pub use sandbox::{Artifact, Sandbox, SandboxOutcome, SandboxVerdict};
pub use store::{EdgeCache, KvStore, ModuleKind, ObjectStore, WasmModule, WorkerLoader, WorkerStub};
