//! The function definition model — the unit of deployment.
//!
//! A [`FunctionDefinition`] is immutable once created; new versions
//! produce a new record. The `type` field discriminates the four
//! execution tiers, and each tier carries its own configuration block.

use crate::duration::DurationSpec;
use crate::id::FunctionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The execution language of a code function.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Plain JavaScript, executed as-is.
    Javascript,
    /// TypeScript, stripped to JavaScript before execution.
    Typescript,
    /// Python, executed in the embedded runtime.
    Python,
    /// Rust, pre-compiled to WASM.
    Rust,
    /// Go, pre-compiled to WASM.
    Go,
    /// Zig, pre-compiled to WASM.
    Zig,
    /// AssemblyScript, pre-compiled to WASM.
    Assemblyscript,
    /// C#, pre-compiled to WASM.
    Csharp,
}

impl Language {
    /// Whether this language executes as a pre-compiled WASM binary.
    pub fn is_wasm_family(&self) -> bool {
        matches!(
            self,
            Language::Rust
                | Language::Go
                | Language::Zig
                | Language::Assemblyscript
                | Language::Csharp
        )
    }

    /// The lowercase wire name for this language.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Zig => "zig",
            Language::Assemblyscript => "assemblyscript",
            Language::Csharp => "csharp",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a code function's source lives.
///
/// The loader resolves each form to text, or to an internal sentinel for
/// binary modalities (the sentinel protocol belongs to the loader and
/// the sandbox router; callers must not inspect it).
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CodeSource {
    /// Source text carried inline in the definition.
    Inline {
        /// The literal source text.
        code: String,
    },
    /// Source stored in a KV namespace.
    Kv {
        /// KV bucket name.
        bucket: String,
        /// Key within the bucket.
        key: String,
    },
    /// Source fetched over HTTP.
    Url {
        /// The URL to GET.
        url: String,
    },
    /// Source stored in the function registry as JSON `{code}`.
    #[serde(rename_all = "camelCase")]
    Registry {
        /// Registry function ID.
        function_id: FunctionId,
        /// Optional version; omitted means the unversioned key.
        version: Option<String>,
    },
    /// A WASM binary in the assets store.
    #[serde(rename_all = "camelCase")]
    Assets {
        /// Owning function ID.
        function_id: FunctionId,
        /// Optional version.
        version: Option<String>,
    },
    /// A WASM binary in the KV store.
    #[serde(rename_all = "camelCase")]
    Wasm {
        /// Owning function ID.
        function_id: FunctionId,
        /// Optional version.
        version: Option<String>,
    },
    /// A WASM binary carried inline, base64-encoded.
    InlineWasm {
        /// Base64-encoded module bytes.
        base64: String,
    },
}

/// Which isolation backend runs a code function.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolateType {
    /// Embedded JavaScript engine scope.
    #[serde(rename = "v8")]
    V8,
    /// Pre-compiled WASM in a loader-provisioned worker.
    #[serde(rename = "wasm")]
    Wasm,
    /// Explicit worker-loader routing (same backend as `wasm`).
    #[serde(rename = "worker-loader")]
    WorkerLoader,
    /// Embedded Python runtime.
    #[serde(rename = "python")]
    Python,
}

impl IsolateType {
    /// The wire name for this isolate type.
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolateType::V8 => "v8",
            IsolateType::Wasm => "wasm",
            IsolateType::WorkerLoader => "worker-loader",
            IsolateType::Python => "python",
        }
    }
}

/// Runtime resource and network policy for one code execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimePolicy {
    /// Memory ceiling in MiB, if enforced.
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
    /// CPU ceiling in milliseconds, if enforced.
    #[serde(default)]
    pub cpu_limit_ms: Option<u64>,
    /// Whether `fetch` is available at all.
    #[serde(default)]
    pub network_enabled: bool,
    /// Hostname allow-list; entries of the form `*.domain` match any
    /// subdomain. Empty means "no restriction beyond `network_enabled`".
    #[serde(default)]
    pub network_allowlist: Vec<String>,
}

/// Sandbox policy for a code function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfig {
    /// Explicit isolate override. None lets the router choose.
    #[serde(default)]
    pub isolate: Option<IsolateType>,
    /// Deterministic mode: pinned clock, pinned randomness.
    #[serde(default)]
    pub deterministic: bool,
    /// Global allow-list; names outside it resolve to `undefined`.
    /// None means "no restriction".
    #[serde(default)]
    pub allowed_globals: Option<Vec<String>>,
    /// Resource and network policy.
    #[serde(flatten)]
    pub policy: RuntimePolicy,
}

/// Retry policy for provider-level failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum total attempts (first try included). None means the
    /// tier's default.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// A few-shot example pair for generative prompting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptExample {
    /// Example input, rendered through the user template.
    pub input: Value,
    /// Expected output, appended as an assistant message.
    pub output: Value,
}

/// A tool the agentic tier may call. The handler is bound separately at
/// registration time and is immutable for the executor's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique name within the function.
    pub name: String,
    /// Human-readable description, shown to the model.
    pub description: String,
    /// JSON-schema subset for the tool's input.
    #[serde(default)]
    pub input_schema: Option<Value>,
}

/// Code-tier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFunction {
    /// Source language.
    pub language: Language,
    /// Where the source lives.
    pub source: CodeSource,
    /// Sandbox policy.
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Default input merged under the caller's input (caller wins).
    #[serde(default)]
    pub default_config: Option<Value>,
}

/// Generative-tier configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerativeFunction {
    /// Model identifier. None means the tier default.
    #[serde(default)]
    pub model: Option<String>,
    /// System prompt template.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// User prompt template. `{{dot.path}}` placeholders substitute
    /// from the input.
    pub user_prompt: String,
    /// Few-shot example pairs.
    #[serde(default)]
    pub examples: Option<Vec<PromptExample>>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Maximum output tokens.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Agentic-tier configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgenticFunction {
    /// System prompt for the loop.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// The goal statement driving the loop.
    pub goal: String,
    /// Tools available to the agent.
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    /// Maximum loop iterations. None means the tier default.
    #[serde(default)]
    pub max_iterations: Option<u32>,
    /// Per-iteration tool-call cap. None means the tier default.
    #[serde(default)]
    pub max_tool_calls_per_iteration: Option<u32>,
    /// Whether conversation memory accumulates across iterations.
    #[serde(default)]
    pub enable_memory: Option<bool>,
    /// Whether reasoning text is requested and recorded.
    #[serde(default)]
    pub enable_reasoning: Option<bool>,
    /// Model identifier. None means the tier default.
    #[serde(default)]
    pub model: Option<String>,
}

/// Human-tier configuration. The approval surface itself is an external
/// collaborator; the engine only records the contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanFunction {
    /// Instructions shown to the approving principal.
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Tier-specific configuration, discriminated by `type`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TierSpec {
    /// Deterministic code execution.
    Code(CodeFunction),
    /// Single-shot generative call.
    Generative(GenerativeFunction),
    /// Multi-step agentic loop with tools.
    Agentic(AgenticFunction),
    /// Human-in-the-loop approval.
    Human(HumanFunction),
}

impl TierSpec {
    /// The lowercase tier name.
    pub fn name(&self) -> &'static str {
        match self {
            TierSpec::Code(_) => "code",
            TierSpec::Generative(_) => "generative",
            TierSpec::Agentic(_) => "agentic",
            TierSpec::Human(_) => "human",
        }
    }
}

/// A deployable unit of compute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDefinition {
    /// Opaque function identifier.
    pub id: FunctionId,
    /// Human-readable name.
    pub name: String,
    /// Semantic version string.
    pub version: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Overall execution timeout. None means the tier default.
    #[serde(default)]
    pub timeout: Option<DurationSpec>,
    /// Provider retry policy.
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// JSON-schema subset for the input.
    #[serde(default)]
    pub input_schema: Option<Value>,
    /// JSON-schema subset for the output.
    #[serde(default)]
    pub output_schema: Option<Value>,
    /// Tier-specific configuration.
    #[serde(flatten)]
    pub tier: TierSpec,
}

impl FunctionDefinition {
    /// Create a definition with required fields; optional fields default
    /// to None.
    pub fn new(
        id: impl Into<FunctionId>,
        name: impl Into<String>,
        version: impl Into<String>,
        tier: TierSpec,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            description: None,
            timeout: None,
            retry_policy: None,
            tags: None,
            input_schema: None,
            output_schema: None,
            tier,
        }
    }
}
