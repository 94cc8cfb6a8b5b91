#![deny(missing_docs)]
//! # strata — umbrella crate
//!
//! A single import surface for the multi-tier function execution
//! platform: the protocol crate, the tier executors, and (behind
//! feature flags) the isolation backends and model providers — plus
//! [`Engine`], the entry point that routes an invocation by its
//! definition's tier.

pub use strata_agentic;
pub use strata_cache;
pub use strata_code;
pub use strata_compile;
pub use strata_generative;
pub use strata_model;
#[cfg(feature = "provider-claude")]
pub use strata_provider_claude;
#[cfg(feature = "provider-gpt")]
pub use strata_provider_gpt;
#[cfg(feature = "sandbox-js")]
pub use strata_sandbox_js;
#[cfg(feature = "sandbox-python")]
pub use strata_sandbox_python;
#[cfg(feature = "sandbox-wasm")]
pub use strata_sandbox_wasm;
pub use strata_schema;
pub use strata_tool;
pub use tier0;

mod engine;

pub use engine::Engine;

/// Happy-path imports for composing strata systems.
pub mod prelude {
    pub use crate::Engine;
    pub use strata_agentic::{AgenticConfig, AgenticExecutor};
    pub use strata_cache::{ArtifactCache, MemoryEdgeCache, ResultCache};
    pub use strata_code::{CodeExecutor, SandboxRouter};
    pub use strata_compile::{Compiler, SourceLoader};
    pub use strata_generative::{GenerativeConfig, GenerativeExecutor};
    pub use strata_model::{Provider, ProviderError, ProviderRouter};
    pub use strata_tool::{ApprovalBroker, ApprovalDecision, ApprovalPolicy, ToolDyn, ToolRegistry};
    pub use tier0::{
        CodeSource, ExecutionContext, ExecutionStatus, FunctionDefinition, FunctionResult,
        Language, SandboxConfig, TierSpec,
    };

    #[cfg(feature = "provider-claude")]
    pub use strata_provider_claude::ClaudeProvider;
    #[cfg(feature = "provider-gpt")]
    pub use strata_provider_gpt::GptProvider;
    #[cfg(feature = "sandbox-js")]
    pub use strata_sandbox_js::JsSandbox;
    #[cfg(feature = "sandbox-python")]
    pub use strata_sandbox_python::PythonSandbox;
    #[cfg(feature = "sandbox-wasm")]
    pub use strata_sandbox_wasm::{WasmSandbox, WasmtimeLoader};
}
