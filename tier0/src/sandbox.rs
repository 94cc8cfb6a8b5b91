//! The Sandbox protocol — what one isolation backend does per call.
//!
//! The three backends (embedded JS, WASM-in-loader, embedded Python)
//! share exactly this interface; the code tier depends only on it. New
//! languages plug in by adding a compiler plus a backend.

use crate::definition::SandboxConfig;
use crate::duration::DurationMs;
use crate::result::SerializedError;
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Sentinel prefix for WASM binaries stored in the assets store.
pub const WASM_ASSETS_PREFIX: &str = "__WASM_ASSETS__:";
/// Sentinel prefix for WASM binaries stored in the KV store.
pub const WASM_KV_PREFIX: &str = "__WASM_KV__:";
/// Sentinel prefix for inline base64 WASM binaries.
pub const WASM_INLINE_PREFIX: &str = "__WASM_INLINE__:";
/// Sentinel prefix for Python source carried as base64.
pub const PYTHON_CODE_PREFIX: &str = "__PYTHON_CODE__:";

/// The output of compilation: what a sandbox actually runs.
///
/// The string sentinel forms (`__WASM_*__`, `__PYTHON_CODE__`) are the
/// wire protocol between the source loader and the sandbox router;
/// [`Artifact`] is their parsed, internal shape.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    /// Executable JavaScript text.
    Js(String),
    /// A WASM binary in the assets store.
    WasmAssets {
        /// Owning function ID.
        function_id: String,
        /// Version, or "latest".
        version: String,
    },
    /// A WASM binary in the KV store.
    WasmKv {
        /// Owning function ID.
        function_id: String,
        /// Version, or "latest".
        version: String,
    },
    /// An inline base64-encoded WASM binary.
    WasmInline {
        /// Base64 module bytes.
        base64: String,
    },
    /// Python source text.
    Python(String),
}

impl Artifact {
    /// Render the artifact back to its sentinel/text wire form.
    pub fn to_wire(&self) -> String {
        match self {
            Artifact::Js(code) => code.clone(),
            Artifact::WasmAssets {
                function_id,
                version,
            } => format!("{WASM_ASSETS_PREFIX}{function_id}:{version}"),
            Artifact::WasmKv {
                function_id,
                version,
            } => format!("{WASM_KV_PREFIX}{function_id}:{version}"),
            Artifact::WasmInline { base64 } => format!("{WASM_INLINE_PREFIX}{base64}"),
            Artifact::Python(code) => {
                use base64::Engine;
                format!(
                    "{PYTHON_CODE_PREFIX}{}",
                    base64::engine::general_purpose::STANDARD.encode(code.as_bytes())
                )
            }
        }
    }

    /// Parse a wire-form artifact string. Plain text (no sentinel
    /// prefix) is JavaScript.
    pub fn from_wire(wire: &str) -> Artifact {
        if let Some(rest) = wire.strip_prefix(WASM_ASSETS_PREFIX) {
            let (id, version) = split_id_version(rest);
            return Artifact::WasmAssets {
                function_id: id,
                version,
            };
        }
        if let Some(rest) = wire.strip_prefix(WASM_KV_PREFIX) {
            let (id, version) = split_id_version(rest);
            return Artifact::WasmKv {
                function_id: id,
                version,
            };
        }
        if let Some(rest) = wire.strip_prefix(WASM_INLINE_PREFIX) {
            return Artifact::WasmInline {
                base64: rest.to_string(),
            };
        }
        if let Some(rest) = wire.strip_prefix(PYTHON_CODE_PREFIX) {
            use base64::Engine;
            let code = base64::engine::general_purpose::STANDARD
                .decode(rest)
                .ok()
                .and_then(|b| String::from_utf8(b).ok())
                .unwrap_or_default();
            return Artifact::Python(code);
        }
        Artifact::Js(wire.to_string())
    }

    /// Whether this artifact is any WASM modality.
    pub fn is_wasm(&self) -> bool {
        matches!(
            self,
            Artifact::WasmAssets { .. } | Artifact::WasmKv { .. } | Artifact::WasmInline { .. }
        )
    }
}

fn split_id_version(rest: &str) -> (String, String) {
    match rest.split_once(':') {
        Some((id, version)) if !version.is_empty() => (id.to_string(), version.to_string()),
        Some((id, _)) => (id.to_string(), "latest".to_string()),
        None => (rest.to_string(), "latest".to_string()),
    }
}

/// How one sandbox run ended.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum SandboxVerdict {
    /// The handler returned a value.
    Completed(Value),
    /// The handler (or the backend) failed.
    Failed(SerializedError),
    /// The deadline expired before the handler finished.
    TimedOut,
    /// The caller's cancellation signal fired.
    Cancelled,
}

/// The outcome of one sandbox run, with best-effort resource metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxOutcome {
    /// How the run ended.
    pub verdict: SandboxVerdict,
    /// Peak memory used in bytes (0 when the backend cannot report).
    pub memory_used_bytes: u64,
    /// CPU time in milliseconds (0 when the backend cannot report).
    pub cpu_time_ms: u64,
    /// Console output collected from user code, when the backend
    /// supports collection; dropped otherwise.
    pub logs: Vec<String>,
}

impl SandboxOutcome {
    /// An outcome with the given verdict and zeroed metrics.
    pub fn from_verdict(verdict: SandboxVerdict) -> Self {
        Self {
            verdict,
            memory_used_bytes: 0,
            cpu_time_ms: 0,
            logs: vec![],
        }
    }

    /// Completed outcome with zeroed metrics.
    pub fn completed(value: Value) -> Self {
        Self::from_verdict(SandboxVerdict::Completed(value))
    }

    /// Failed outcome with zeroed metrics.
    pub fn failed(error: SerializedError) -> Self {
        Self::from_verdict(SandboxVerdict::Failed(error))
    }
}

/// Protocol — one isolation backend.
///
/// `run` means "cause this artifact to execute once under this policy
/// and deadline." Implementations must resolve rather than throw: every
/// user-space failure becomes a [`SandboxVerdict`] variant. Neither the
/// deadline nor the cancellation token interrupts running user code
/// synchronously; both are cooperative races, and bounded-step
/// completion is the backend's responsibility.
#[async_trait]
pub trait Sandbox: Send + Sync + std::fmt::Debug {
    /// Execute the artifact with the given input.
    async fn run(
        &self,
        artifact: &Artifact,
        input: &Value,
        policy: &SandboxConfig,
        deadline: DurationMs,
        cancel: &CancellationToken,
    ) -> SandboxOutcome;
}
