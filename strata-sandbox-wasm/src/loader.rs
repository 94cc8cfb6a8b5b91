//! In-process worker-loader binding backed by wasmtime.
//!
//! `put` compiles each module once per worker id (idempotent); the
//! returned stub instantiates per invocation, so one misbehaving call
//! cannot poison the next. Epoch interruption bounds runaway guests:
//! a ticker thread advances the engine epoch every 10 ms and each store
//! gets a deadline in ticks.
//!
//! Guest ABI: exported `memory`, `alloc(len: i32) -> i32`, and
//! `handler(ptr: i32, len: i32) -> i64` where the result packs the
//! response as `(ptr << 32) | len`. Request and response bodies are
//! JSON bytes.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tier0::{EngineError, ErrorKind, WasmModule, WorkerId, WorkerLoader, WorkerStub};
use tracing::debug;
use wasmtime::{Config, Engine, Instance, Module, Store};

/// Epoch tick interval; deadlines are expressed in these ticks.
const EPOCH_TICK: Duration = Duration::from_millis(10);

/// Default per-invocation deadline, in ticks (30 s).
const DEFAULT_DEADLINE_TICKS: u64 = 3_000;

/// Wasmtime-backed [`WorkerLoader`].
pub struct WasmtimeLoader {
    engine: Engine,
    workers: Mutex<HashMap<WorkerId, Arc<dyn WorkerStub>>>,
    deadline_ticks: u64,
    _ticker: TickerGuard,
}

/// Stops the epoch ticker thread when the loader is dropped.
struct TickerGuard {
    stop: Arc<AtomicBool>,
}

impl Drop for TickerGuard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl WasmtimeLoader {
    /// Create a loader with the default 30-second guest deadline.
    pub fn new() -> Result<Self, EngineError> {
        Self::with_deadline(Duration::from_secs(30))
    }

    /// Create a loader with an explicit guest deadline.
    pub fn with_deadline(deadline: Duration) -> Result<Self, EngineError> {
        let mut config = Config::new();
        config.epoch_interruption(true);
        let engine = Engine::new(&config).map_err(|e| {
            EngineError::new(
                ErrorKind::WasmExecutionError,
                format!("wasm engine init failed: {e}"),
            )
        })?;

        let stop = Arc::new(AtomicBool::new(false));
        {
            let engine = engine.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    std::thread::sleep(EPOCH_TICK);
                    engine.increment_epoch();
                }
            });
        }

        let deadline_ticks = (deadline.as_millis() as u64 / EPOCH_TICK.as_millis() as u64).max(1);
        Ok(Self {
            engine,
            workers: Mutex::new(HashMap::new()),
            deadline_ticks,
            _ticker: TickerGuard { stop },
        })
    }
}

#[async_trait]
impl WorkerLoader for WasmtimeLoader {
    async fn put(
        &self,
        id: &WorkerId,
        _wrapper_script: &str,
        modules: Vec<WasmModule>,
    ) -> Result<Arc<dyn WorkerStub>, EngineError> {
        if let Some(existing) = self.workers.lock().expect("worker map lock").get(id) {
            return Ok(existing.clone());
        }

        let binary = modules
            .iter()
            .find(|m| m.kind == tier0::ModuleKind::Compiled)
            .ok_or_else(|| {
                EngineError::new(
                    ErrorKind::WasmExecutionError,
                    "worker provisioning requires one compiled module",
                )
            })?;

        let module = Module::new(&self.engine, &binary.content).map_err(|e| {
            EngineError::new(
                ErrorKind::WasmDecodeError,
                format!("wasm module decode failed: {e}"),
            )
        })?;
        debug!(worker = %id, "compiled wasm worker");

        let stub: Arc<dyn WorkerStub> = Arc::new(WasmtimeStub {
            engine: self.engine.clone(),
            module,
            deadline_ticks: self.deadline_ticks,
        });
        self.workers
            .lock()
            .expect("worker map lock")
            .insert(id.clone(), stub.clone());
        Ok(stub)
    }
}

/// One compiled worker; instantiates per invocation.
struct WasmtimeStub {
    engine: Engine,
    module: Module,
    deadline_ticks: u64,
}

impl std::fmt::Debug for WasmtimeStub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmtimeStub")
            .field("deadline_ticks", &self.deadline_ticks)
            .finish()
    }
}

#[async_trait]
impl WorkerStub for WasmtimeStub {
    async fn invoke(&self, body: Value) -> Result<Value, EngineError> {
        let engine = self.engine.clone();
        let module = self.module.clone();
        let deadline_ticks = self.deadline_ticks;

        let joined = tokio::task::spawn_blocking(move || {
            invoke_sync(&engine, &module, deadline_ticks, &body)
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(join_error) => Err(EngineError::new(
                ErrorKind::WasmExecutionError,
                format!("wasm invocation thread failed: {join_error}"),
            )),
        }
    }
}

fn invoke_sync(
    engine: &Engine,
    module: &Module,
    deadline_ticks: u64,
    body: &Value,
) -> Result<Value, EngineError> {
    let wasm_error = |message: String| EngineError::new(ErrorKind::WasmExecutionError, message);

    let request = serde_json::to_vec(body)
        .map_err(|e| wasm_error(format!("request body serialization failed: {e}")))?;

    let mut store: Store<()> = Store::new(engine, ());
    store.set_epoch_deadline(deadline_ticks);

    let instance = Instance::new(&mut store, module, &[])
        .map_err(|e| wasm_error(format!("wasm instantiation failed: {e}")))?;

    let memory = instance
        .get_memory(&mut store, "memory")
        .ok_or_else(|| wasm_error("wasm module exports no memory".into()))?;
    let alloc = instance
        .get_typed_func::<i32, i32>(&mut store, "alloc")
        .map_err(|e| wasm_error(format!("wasm module exports no alloc: {e}")))?;
    let handler = instance
        .get_typed_func::<(i32, i32), i64>(&mut store, "handler")
        .map_err(|e| wasm_error(format!("wasm module exports no handler: {e}")))?;

    let len = request.len() as i32;
    let ptr = alloc
        .call(&mut store, len)
        .map_err(|e| classify_trap(e, "alloc"))?;
    memory
        .write(&mut store, ptr as usize, &request)
        .map_err(|e| wasm_error(format!("request write failed: {e}")))?;

    let packed = handler
        .call(&mut store, (ptr, len))
        .map_err(|e| classify_trap(e, "handler"))?;
    let out_ptr = (packed >> 32) as u32 as usize;
    let out_len = packed as u32 as usize;

    let mut response = vec![0u8; out_len];
    memory
        .read(&store, out_ptr, &mut response)
        .map_err(|e| wasm_error(format!("response read failed: {e}")))?;

    serde_json::from_slice(&response)
        .map_err(|e| wasm_error(format!("response was not valid JSON: {e}")))
}

/// Epoch-deadline traps become timeouts; everything else is a wasm
/// execution failure.
fn classify_trap(error: wasmtime::Error, export: &str) -> EngineError {
    let message = format!("{export} trapped: {error:#}");
    if message.contains("epoch deadline") || message.contains("interrupt") {
        EngineError::timeout(format!("wasm {export} exceeded its deadline"))
    } else {
        EngineError::new(ErrorKind::WasmExecutionError, message)
    }
}
