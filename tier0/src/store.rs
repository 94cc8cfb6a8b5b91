//! Collaborator protocols: stores, the edge cache, and the worker loader.
//!
//! These are the external seams of the engine. Test doubles are trivial
//! maps (see `test_utils`); production deployments bind real backends.

use crate::error::EngineError;
use crate::id::WorkerId;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Read-only key→bytes store (function registry, WASM binaries).
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the bytes at `key`, or None if absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError>;
}

/// Read-only object store with text-oriented access (static assets).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the object at `key` as bytes, or None if absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError>;
}

/// Best-effort shared cache with TTL-bounded entries.
///
/// A miss on a present entry is allowed; eviction is opaque. Writes are
/// last-write-wins, which is safe because entries are content-addressed
/// and therefore value-equal under the same key.
#[async_trait]
pub trait EdgeCache: Send + Sync {
    /// Look up a cached value by key.
    async fn get_by_key(&self, key: &str) -> Option<Value>;

    /// Store a value under `key` for at most `ttl_seconds`.
    async fn put(&self, key: &str, value: Value, ttl_seconds: u64);
}

/// The kind of a module shipped to a worker.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// A pre-compiled WASM binary.
    Compiled,
    /// Plain text payload.
    Text,
    /// JSON payload.
    Json,
}

/// A module attached to a worker at provisioning time.
#[derive(Debug, Clone)]
pub struct WasmModule {
    /// Module name as seen by the wrapper (e.g. `module.wasm`).
    pub name: String,
    /// Payload kind.
    pub kind: ModuleKind,
    /// Raw payload bytes.
    pub content: Vec<u8>,
}

/// A provisioned worker: accepts one request body, returns one response.
#[async_trait]
pub trait WorkerStub: Send + Sync + std::fmt::Debug {
    /// Post the JSON body to the worker and return its JSON response.
    async fn invoke(&self, body: Value) -> Result<Value, EngineError>;
}

/// The worker-loader binding: provision isolated workers from modules.
///
/// `put` with the same id must be idempotent — repeated provisioning of
/// an identical worker returns a stub for the same underlying instance.
#[async_trait]
pub trait WorkerLoader: Send + Sync {
    /// Provision (or reuse) a worker with the given wrapper script and
    /// attached modules, returning its stub.
    async fn put(
        &self,
        id: &WorkerId,
        wrapper_script: &str,
        modules: Vec<WasmModule>,
    ) -> Result<Arc<dyn WorkerStub>, EngineError>;
}
