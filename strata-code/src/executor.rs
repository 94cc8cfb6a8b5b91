//! The code tier: load → compile → route → run → uniform result.

use crate::router::{preflight, select_isolate, SandboxRouter};
use chrono::Utc;
use serde_json::Value;
use std::time::Instant;
use strata_compile::{Compiler, SourceLoader};
use tier0::{
    json_size_bytes, CodeExecution, CodeFunction, DurationMs, EngineError, ErrorKind,
    ExecutionContext, ExecutionId, ExecutionMetadata, ExecutionMetrics, ExecutionStatus,
    FunctionDefinition, FunctionResult, SandboxOutcome, SandboxVerdict, SerializedError,
    TierExecution, TierSpec,
};
use tracing::debug;

/// Default code-tier timeout when neither the definition nor the caller
/// sets one.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// The code-tier executor. Owns the loader, the compiler (with its
/// artifact cache), and the sandbox router.
pub struct CodeExecutor {
    loader: SourceLoader,
    compiler: Compiler,
    router: SandboxRouter,
}

impl CodeExecutor {
    /// Build an executor from its three collaborators.
    pub fn new(loader: SourceLoader, compiler: Compiler, router: SandboxRouter) -> Self {
        Self {
            loader,
            compiler,
            router,
        }
    }

    /// Execute a code function definition.
    ///
    /// Returns `Err` only for host-side programming errors (a
    /// non-code definition, a missing collaborator binding). Everything
    /// user-space — load misses, compile failures, thrown handlers,
    /// timeouts — folds into the returned result's status.
    pub async fn execute(
        &self,
        definition: &FunctionDefinition,
        input: Value,
        context: &ExecutionContext,
    ) -> Result<FunctionResult, EngineError> {
        let TierSpec::Code(code) = &definition.tier else {
            return Err(EngineError::invalid_input(format!(
                "definition {} is not a code function",
                definition.id
            )));
        };

        let timeout = resolve_timeout(definition, context)?;
        let started_at = Utc::now();
        let wall_start = Instant::now();
        let execution_id = ExecutionId::generate();
        debug!(function = %definition.id, execution = %execution_id, "code execution start");

        let input = merge_default_config(code, input);
        let assembler = ResultAssembler {
            definition,
            code,
            execution_id,
            started_at,
            context,
            input_size_bytes: json_size_bytes(&input),
        };

        // Source loading happens before the execution clock starts.
        let wire = match self.loader.load(&code.source).await {
            Ok(wire) => wire,
            Err(e) if e.kind == ErrorKind::ConfigurationError => return Err(e),
            Err(e) => return Ok(assembler.failed(e, wall_start, 0, false, None)),
        };

        let compiled = match self.compiler.compile(code.language, &wire).await {
            Ok(compiled) => compiled,
            Err(e) => return Ok(assembler.failed(e, wall_start, 0, false, None)),
        };

        let isolate = select_isolate(code.language, &code.sandbox);
        let backend = self.router.backend(isolate)?;

        // The execution clock: pre-run policy checks count against it,
        // source loading above does not.
        let exec_start = Instant::now();
        if let Err(e) = preflight(&compiled.artifact, &code.sandbox) {
            return Ok(assembler.failed(
                e,
                wall_start,
                compiled.compilation_time_ms,
                compiled.cache_hit,
                Some(isolate),
            ));
        }

        let remaining = timeout.saturating_sub(DurationMs::from(exec_start.elapsed()));
        let outcome = backend
            .run(
                &compiled.artifact,
                &input,
                &code.sandbox,
                remaining,
                &context.cancel,
            )
            .await;

        Ok(assembler.from_outcome(
            outcome,
            wall_start,
            timeout,
            compiled.compilation_time_ms,
            compiled.cache_hit,
            isolate,
        ))
    }
}

/// Resolve the effective timeout: caller override, then definition,
/// then the 5-second default.
fn resolve_timeout(
    definition: &FunctionDefinition,
    context: &ExecutionContext,
) -> Result<DurationMs, EngineError> {
    if let Some(spec) = &context.timeout {
        return spec.resolve();
    }
    if let Some(spec) = &definition.timeout {
        return spec.resolve();
    }
    Ok(DurationMs::from_millis(DEFAULT_TIMEOUT_MS))
}

/// Merge the definition's default config under the caller's input
/// (caller wins, shallow).
fn merge_default_config(code: &CodeFunction, input: Value) -> Value {
    let Some(Value::Object(defaults)) = &code.default_config else {
        return input;
    };
    match input {
        Value::Object(mut map) => {
            for (k, v) in defaults {
                map.entry(k.clone()).or_insert_with(|| v.clone());
            }
            Value::Object(map)
        }
        other => other,
    }
}

/// Builds the uniform result for every terminal path.
struct ResultAssembler<'a> {
    definition: &'a FunctionDefinition,
    code: &'a CodeFunction,
    execution_id: ExecutionId,
    started_at: chrono::DateTime<Utc>,
    context: &'a ExecutionContext,
    input_size_bytes: u64,
}

impl ResultAssembler<'_> {
    fn base(
        &self,
        status: ExecutionStatus,
        output: Option<Value>,
        error: Option<SerializedError>,
        wall_start: Instant,
        code_execution: CodeExecution,
    ) -> FunctionResult {
        let duration_ms = wall_start.elapsed().as_millis() as u64;
        let completed_at = self.started_at + chrono::Duration::milliseconds(duration_ms as i64);
        let output_size_bytes = output.as_ref().map(json_size_bytes).unwrap_or(0);
        FunctionResult {
            execution_id: self.execution_id.clone(),
            function_id: self.definition.id.clone(),
            function_version: self.definition.version.clone(),
            status,
            output,
            error,
            metrics: ExecutionMetrics {
                duration_ms,
                input_size_bytes: self.input_size_bytes,
                output_size_bytes,
                retry_count: 0,
                tokens: None,
                compute_units: if code_execution.cpu_time_ms > 0 {
                    Some(code_execution.cpu_time_ms as f64 / 1000.0)
                } else {
                    None
                },
            },
            metadata: ExecutionMetadata {
                started_at: self.started_at,
                completed_at: Some(completed_at),
                trace_id: self.context.trace_id.clone(),
                span_id: self.context.span_id.clone(),
                triggered_by: self.context.triggered_by.clone(),
                workflow_context: self.context.workflow_context.clone(),
            },
            execution: Some(TierExecution::CodeExecution(code_execution)),
        }
    }

    fn code_execution(
        &self,
        compilation_time_ms: u64,
        cache_hit: bool,
        isolate: Option<tier0::IsolateType>,
        memory_used_bytes: u64,
        cpu_time_ms: u64,
    ) -> CodeExecution {
        CodeExecution {
            language: self.code.language,
            isolate_type: isolate
                .unwrap_or_else(|| select_isolate(self.code.language, &self.code.sandbox)),
            memory_used_bytes,
            cpu_time_ms,
            deterministic: self.code.sandbox.deterministic,
            compilation_time_ms,
            cache_hit,
        }
    }

    /// A pre-execution failure (load, compile, or tripwire).
    fn failed(
        &self,
        error: EngineError,
        wall_start: Instant,
        compilation_time_ms: u64,
        cache_hit: bool,
        isolate: Option<tier0::IsolateType>,
    ) -> FunctionResult {
        let status = if error.mentions_timeout() {
            ExecutionStatus::Timeout
        } else {
            ExecutionStatus::Failed
        };
        self.base(
            status,
            None,
            Some((&error).into()),
            wall_start,
            self.code_execution(compilation_time_ms, cache_hit, isolate, 0, 0),
        )
    }

    /// Map a sandbox outcome into the uniform result.
    fn from_outcome(
        &self,
        outcome: SandboxOutcome,
        wall_start: Instant,
        timeout: DurationMs,
        compilation_time_ms: u64,
        cache_hit: bool,
        isolate: tier0::IsolateType,
    ) -> FunctionResult {
        let code_execution = self.code_execution(
            compilation_time_ms,
            cache_hit,
            Some(isolate),
            outcome.memory_used_bytes,
            outcome.cpu_time_ms,
        );

        match outcome.verdict {
            SandboxVerdict::Completed(output) => self.base(
                ExecutionStatus::Completed,
                Some(output),
                None,
                wall_start,
                code_execution,
            ),
            SandboxVerdict::Failed(error) => {
                // Timeout-shaped failures surface as timeouts even when
                // the backend reported them as plain errors.
                if error.message.to_lowercase().contains("timeout") {
                    let error = SerializedError {
                        name: ErrorKind::TimeoutError.name().into(),
                        ..error
                    };
                    self.base(
                        ExecutionStatus::Timeout,
                        None,
                        Some(strip_partial(error)),
                        wall_start,
                        code_execution,
                    )
                } else {
                    // A handler that throws with a partial result
                    // exposes it as the result's output.
                    let partial = error.partial_result.clone();
                    self.base(
                        ExecutionStatus::Failed,
                        partial,
                        Some(error),
                        wall_start,
                        code_execution,
                    )
                }
            }
            SandboxVerdict::TimedOut => self.base(
                ExecutionStatus::Timeout,
                None,
                Some(SerializedError {
                    name: ErrorKind::TimeoutError.name().into(),
                    message: format!("Execution timed out after {}ms", timeout.as_millis()),
                    code: None,
                    stack: None,
                    retryable: false,
                    partial_result: None,
                }),
                wall_start,
                code_execution,
            ),
            SandboxVerdict::Cancelled => self.base(
                ExecutionStatus::Cancelled,
                None,
                Some(SerializedError {
                    name: "Error".into(),
                    message: "Execution was cancelled".into(),
                    code: None,
                    stack: None,
                    retryable: false,
                    partial_result: None,
                }),
                wall_start,
                code_execution,
            ),
            _ => unreachable!("SandboxVerdict has no other variants in this workspace"),
        }
    }
}

/// A timeout result never carries partial output.
fn strip_partial(error: SerializedError) -> SerializedError {
    SerializedError {
        partial_result: None,
        ..error
    }
}
