#![deny(missing_docs)]
//! WASM isolation backend for the strata code tier.
//!
//! The host runtime forbids arbitrary dynamic compilation, so execution
//! goes through a worker-loader binding: the sentinel artifact is
//! resolved to binary bytes, the binary is provisioned as a worker (a
//! content-derived id keeps `put` idempotent), and the worker's stub is
//! invoked with the JSON request body. The stub's response is
//! `{output}` on success or `{error, stack}` on guest failure.
//!
//! [`WasmtimeLoader`] is the in-process implementation of the binding.

pub mod loader;

pub use loader::WasmtimeLoader;

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::Value;
use std::sync::Arc;
use tier0::{
    content_hash, Artifact, DurationMs, EngineError, ErrorKind, KvStore, ModuleKind, ObjectStore,
    Sandbox, SandboxConfig, SandboxOutcome, SandboxVerdict, SerializedError, WasmModule, WorkerId,
    WorkerLoader,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The loader-backed WASM sandbox.
#[derive(Default, Clone)]
pub struct WasmSandbox {
    loader: Option<Arc<dyn WorkerLoader>>,
    kv: Option<Arc<dyn KvStore>>,
    assets: Option<Arc<dyn ObjectStore>>,
}

impl std::fmt::Debug for WasmSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmSandbox")
            .field("loader", &self.loader.is_some())
            .field("kv", &self.kv.is_some())
            .field("assets", &self.assets.is_some())
            .finish()
    }
}

impl WasmSandbox {
    /// A sandbox with no bindings; every run fails until a loader is
    /// attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the worker-loader binding.
    pub fn with_loader(mut self, loader: Arc<dyn WorkerLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Attach the KV binding for `__WASM_KV__` sentinels.
    pub fn with_kv(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Attach the assets binding for `__WASM_ASSETS__` sentinels.
    pub fn with_assets(mut self, assets: Arc<dyn ObjectStore>) -> Self {
        self.assets = Some(assets);
        self
    }

    /// Resolve a sentinel artifact to binary bytes.
    async fn resolve_binary(&self, artifact: &Artifact) -> Result<Vec<u8>, EngineError> {
        match artifact {
            Artifact::WasmInline { base64 } => base64::engine::general_purpose::STANDARD
                .decode(base64.trim())
                .map_err(|e| {
                    EngineError::new(
                        ErrorKind::WasmDecodeError,
                        format!("inline wasm base64 decode failed: {e}"),
                    )
                }),
            Artifact::WasmKv {
                function_id,
                version,
            } => {
                let kv = self.kv.as_ref().ok_or_else(|| {
                    EngineError::configuration("wasm kv source requires a KV binding")
                })?;
                let key = format!("{function_id}:{version}");
                kv.get(&key).await?.ok_or_else(|| {
                    EngineError::new(
                        ErrorKind::WasmNotFoundError,
                        format!("wasm binary not found in kv: {key}"),
                    )
                })
            }
            Artifact::WasmAssets {
                function_id,
                version,
            } => {
                let assets = self.assets.as_ref().ok_or_else(|| {
                    EngineError::configuration("wasm assets source requires an assets binding")
                })?;
                let key = format!("wasm/{function_id}/{version}.wasm");
                assets.get(&key).await?.ok_or_else(|| {
                    EngineError::new(
                        ErrorKind::WasmNotFoundError,
                        format!("wasm binary not found in assets: {key}"),
                    )
                })
            }
            other => Err(EngineError::new(
                ErrorKind::WasmExecutionError,
                format!("wasm sandbox received a non-wasm artifact: {other:?}"),
            )),
        }
    }
}

/// The host-side wrapper submitted with each worker. The in-process
/// loader compiles the attached module directly; remote loader bindings
/// execute this script against their own `module.wasm` import.
fn wrapper_script(worker_id: &WorkerId) -> String {
    format!(
        "// worker {worker_id}\n\
         import module from 'module.wasm';\n\
         export default {{\n\
           async fetch(request) {{\n\
             const instance = await WebAssembly.instantiate(module);\n\
             const body = await request.json();\n\
             try {{\n\
               const output = instance.exports.handler(body);\n\
               return Response.json({{ output }});\n\
             }} catch (e) {{\n\
               return Response.json({{ error: String(e && e.message || e), stack: e && e.stack }});\n\
             }}\n\
           }}\n\
         }};\n"
    )
}

#[async_trait]
impl Sandbox for WasmSandbox {
    async fn run(
        &self,
        artifact: &Artifact,
        input: &Value,
        _policy: &SandboxConfig,
        deadline: DurationMs,
        cancel: &CancellationToken,
    ) -> SandboxOutcome {
        let Some(loader) = &self.loader else {
            return SandboxOutcome::failed(SerializedError {
                name: ErrorKind::WasmExecutionError.name().into(),
                message: "worker-loader binding is unavailable (no put capability); \
                          WASM execution requires a configured loader, this is not a \
                          usage error in the function"
                    .into(),
                code: None,
                stack: None,
                retryable: false,
                partial_result: None,
            });
        };

        let binary = match self.resolve_binary(artifact).await {
            Ok(binary) => binary,
            Err(e) => return SandboxOutcome::failed((&e).into()),
        };

        let worker_id = WorkerId::new(format!(
            "wasm_{}",
            &content_hash(&base64::engine::general_purpose::STANDARD.encode(&binary))[..16]
        ));
        debug!(worker = %worker_id, bytes = binary.len(), "provisioning wasm worker");

        let stub = match loader
            .put(
                &worker_id,
                &wrapper_script(&worker_id),
                vec![WasmModule {
                    name: "module.wasm".into(),
                    kind: ModuleKind::Compiled,
                    content: binary,
                }],
            )
            .await
        {
            Ok(stub) => stub,
            Err(e) => return SandboxOutcome::failed((&e).into()),
        };

        let invocation = stub.invoke(input.clone());
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return SandboxOutcome::from_verdict(SandboxVerdict::TimedOut);
            }
            _ = tokio::time::sleep(deadline.to_std()) => {
                return SandboxOutcome::from_verdict(SandboxVerdict::TimedOut);
            }
            result = invocation => result,
        };

        match result {
            Ok(response) => {
                if let Some(error) = response.get("error") {
                    let message = error.as_str().map(str::to_owned).unwrap_or_else(|| error.to_string());
                    let stack = response
                        .get("stack")
                        .and_then(Value::as_str)
                        .map(str::to_owned);
                    SandboxOutcome::failed(SerializedError {
                        name: "Error".into(),
                        message,
                        code: None,
                        stack,
                        retryable: false,
                        partial_result: None,
                    })
                } else {
                    let output = response.get("output").cloned().unwrap_or(Value::Null);
                    SandboxOutcome::completed(output)
                }
            }
            Err(e) if e.kind == ErrorKind::TimeoutError => {
                SandboxOutcome::from_verdict(SandboxVerdict::TimedOut)
            }
            Err(e) => SandboxOutcome::failed((&e).into()),
        }
    }
}
