#![deny(missing_docs)]
//! Embedded Python isolation backend.
//!
//! A reusable runtime over the embedded interpreter: loaded lazily on
//! first use and kept for the process lifetime. Values cross the
//! boundary through Python's `json` module, which gives exactly the
//! required mapping (dict↔object, list↔array, None↔null, int/float→
//! number, bool→boolean, strings pass through).
//!
//! `async def` handlers are detected with `inspect.iscoroutine` and
//! driven by `asyncio.run`. Exceptions surface with their Python type
//! name literally in the message (`ValueError: ...`). Execution runs on
//! a blocking thread raced against the deadline.

use async_trait::async_trait;
use pyo3::prelude::*;
use pyo3::types::{PyModule, PyString};
use serde_json::Value;
use std::ffi::CString;
use std::time::Instant;
use tier0::{
    Artifact, DurationMs, ErrorKind, Sandbox, SandboxConfig, SandboxOutcome, SandboxVerdict,
    SerializedError,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The result of one Python execution, in the runtime collaborator's
/// contract shape.
#[derive(Debug, Clone, PartialEq)]
pub struct PythonExecution {
    /// Whether the handler returned without raising.
    pub success: bool,
    /// The handler's return value (JSON-mapped), on success.
    pub output: Option<Value>,
    /// The error message, on failure. Contains the Python exception
    /// type name literally (e.g. `ValueError: x`).
    pub error: Option<String>,
    /// The Python exception type name, on failure.
    pub error_type: Option<String>,
    /// Formatted traceback, when available.
    pub stack_trace: Option<String>,
    /// Peak memory used, best-effort (0 when unavailable).
    pub memory_used_bytes: u64,
    /// Whether the deadline expired before the handler finished.
    pub timed_out: bool,
}

impl PythonExecution {
    fn failure(message: String, error_type: Option<String>, stack_trace: Option<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(message),
            error_type,
            stack_trace,
            memory_used_bytes: 0,
            timed_out: false,
        }
    }
}

/// The embedded Python runtime. Cheap to clone; the interpreter itself
/// is process-global.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonRuntime;

impl PythonRuntime {
    /// Handle to the shared runtime.
    pub fn new() -> Self {
        Self
    }

    /// Execute `entry` from `source` with `args` as its single
    /// argument, bounded by `timeout_ms`.
    pub async fn execute(
        &self,
        source: &str,
        entry: &str,
        args: &Value,
        timeout_ms: u64,
    ) -> PythonExecution {
        let source = source.to_string();
        let entry = entry.to_string();
        let args_json = serde_json::to_string(args).unwrap_or_else(|_| "null".into());

        let handle =
            tokio::task::spawn_blocking(move || run_in_interpreter(&source, &entry, &args_json));

        let joined = tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_millis(timeout_ms)) => {
                debug!(timeout_ms, "python execution deadline expired");
                return PythonExecution {
                    success: false,
                    output: None,
                    error: Some(format!("python execution exceeded {timeout_ms}ms")),
                    error_type: None,
                    stack_trace: None,
                    memory_used_bytes: 0,
                    timed_out: true,
                };
            }
            joined = handle => joined,
        };

        match joined {
            Ok(execution) => execution,
            Err(join_error) => PythonExecution::failure(
                format!("python execution thread failed: {join_error}"),
                None,
                None,
            ),
        }
    }
}

/// Load the module, call the entry point, map the result. Runs with the
/// GIL held on the calling thread.
fn run_in_interpreter(source: &str, entry: &str, args_json: &str) -> PythonExecution {
    Python::with_gil(|py| {
        let code = match CString::new(source) {
            Ok(code) => code,
            Err(_) => {
                return PythonExecution::failure(
                    "SyntaxError: source contains a NUL byte".into(),
                    Some("SyntaxError".into()),
                    None,
                )
            }
        };

        let module =
            match PyModule::from_code(py, code.as_c_str(), c"function_module.py", c"function_module")
            {
                Ok(module) => module,
                Err(err) => return failure_from_pyerr(py, err),
            };

        let handler = match module.getattr(entry) {
            Ok(handler) => handler,
            Err(_) => {
                return PythonExecution::failure(
                    format!("Python function '{entry}' handler is not defined in module"),
                    Some("NameError".into()),
                    None,
                )
            }
        };

        let json_module = match py.import("json") {
            Ok(m) => m,
            Err(err) => return failure_from_pyerr(py, err),
        };
        let args_obj = match json_module
            .getattr("loads")
            .and_then(|loads| loads.call1((PyString::new(py, args_json),)))
        {
            Ok(obj) => obj,
            Err(err) => return failure_from_pyerr(py, err),
        };

        let result = match handler.call1((args_obj,)) {
            Ok(result) => result,
            Err(err) => return failure_from_pyerr(py, err),
        };

        // Await coroutines from `async def` handlers.
        let result = match py
            .import("inspect")
            .and_then(|inspect| inspect.getattr("iscoroutine"))
            .and_then(|is_coro| is_coro.call1((&result,)))
            .and_then(|flag| flag.extract::<bool>())
        {
            Ok(true) => match py
                .import("asyncio")
                .and_then(|asyncio| asyncio.getattr("run"))
                .and_then(|run| run.call1((result,)))
            {
                Ok(awaited) => awaited,
                Err(err) => return failure_from_pyerr(py, err),
            },
            Ok(false) => result,
            Err(err) => return failure_from_pyerr(py, err),
        };

        let dumped = match json_module
            .getattr("dumps")
            .and_then(|dumps| dumps.call1((result,)))
            .and_then(|s| s.extract::<String>())
        {
            Ok(dumped) => dumped,
            Err(err) => return failure_from_pyerr(py, err),
        };

        match serde_json::from_str(&dumped) {
            Ok(output) => PythonExecution {
                success: true,
                output: Some(output),
                error: None,
                error_type: None,
                stack_trace: None,
                memory_used_bytes: 0,
                timed_out: false,
            },
            Err(e) => PythonExecution::failure(
                format!("python output was not representable as JSON: {e}"),
                None,
                None,
            ),
        }
    })
}

/// Flatten a Python exception: `PyErr`'s display form already leads
/// with the type name (`ValueError: x`).
fn failure_from_pyerr(py: Python<'_>, err: PyErr) -> PythonExecution {
    let message = err.to_string();
    let error_type = message
        .split(':')
        .next()
        .map(str::trim)
        .filter(|head| !head.is_empty())
        .map(str::to_owned);
    let stack_trace = err
        .traceback(py)
        .and_then(|tb| tb.format().ok());
    PythonExecution::failure(message, error_type, stack_trace)
}

/// The [`Sandbox`] face of the runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonSandbox {
    runtime: PythonRuntime,
}

impl PythonSandbox {
    /// A sandbox over the shared runtime.
    pub fn new() -> Self {
        Self {
            runtime: PythonRuntime::new(),
        }
    }
}

#[async_trait]
impl Sandbox for PythonSandbox {
    async fn run(
        &self,
        artifact: &Artifact,
        input: &Value,
        _policy: &SandboxConfig,
        deadline: DurationMs,
        cancel: &CancellationToken,
    ) -> SandboxOutcome {
        let Artifact::Python(source) = artifact else {
            return SandboxOutcome::failed(SerializedError {
                name: ErrorKind::PythonExecutionError.name().into(),
                message: "python sandbox received a non-python artifact".into(),
                code: None,
                stack: None,
                retryable: false,
                partial_result: None,
            });
        };

        if cancel.is_cancelled() {
            return SandboxOutcome::from_verdict(SandboxVerdict::Cancelled);
        }

        let start = Instant::now();
        let execution = self
            .runtime
            .execute(source, "handler", input, deadline.as_millis())
            .await;
        let cpu_time_ms = start.elapsed().as_millis() as u64;

        let mut outcome = if execution.timed_out {
            SandboxOutcome::from_verdict(SandboxVerdict::TimedOut)
        } else if execution.success {
            SandboxOutcome::completed(execution.output.unwrap_or(Value::Null))
        } else {
            let message = execution
                .error
                .unwrap_or_else(|| "python execution failed".into());
            SandboxOutcome::failed(SerializedError {
                name: ErrorKind::PythonError.name().into(),
                message,
                code: execution.error_type,
                stack: execution.stack_trace,
                retryable: false,
                partial_result: None,
            })
        };

        // Memory peaks are not observable per-call in the embedded
        // interpreter; report zero.
        outcome.memory_used_bytes = execution.memory_used_bytes;
        outcome.cpu_time_ms = cpu_time_ms;
        outcome
    }
}
