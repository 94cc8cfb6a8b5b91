//! The generative tier: one templated model call with schema-driven
//! self-retry, provider retry, and a content-addressed result cache.

use crate::parse::parse_model_output;
use crate::template::render_template;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use strata_cache::ResultCache;
use strata_model::{
    call_with_retry, resolve_model, Provider, ProviderError, ProviderMessage, ProviderRequest,
    DEFAULT_MAX_ATTEMPTS,
};
use tier0::{
    content_hash, json_size_bytes, DurationMs, EngineError, ErrorKind, ExecutionContext,
    ExecutionId, ExecutionMetadata, ExecutionMetrics, ExecutionStatus, FunctionDefinition,
    FunctionResult, GenerativeExecution, GenerativeFunction, PromptRecord, SerializedError,
    TierExecution, TierSpec, TokenUsage,
};
use tracing::debug;

/// Default generative timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Additional same-prompt attempts after an invalid output.
pub const SCHEMA_RETRY_LIMIT: u32 = 2;

/// Executor-level configuration.
#[derive(Debug, Clone, Default)]
pub struct GenerativeConfig {
    /// Whether the result cache is consulted and written.
    pub cache_enabled: bool,
    /// Whether Gemini identifiers are accepted.
    pub gemini_configured: bool,
}

/// The generative-tier executor, generic over the provider.
pub struct GenerativeExecutor<P: Provider> {
    pub(crate) provider: P,
    cache: Option<Arc<ResultCache>>,
    config: GenerativeConfig,
}

impl<P: Provider> GenerativeExecutor<P> {
    /// Build an executor over a provider with default configuration.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            cache: None,
            config: GenerativeConfig::default(),
        }
    }

    /// Attach a result cache.
    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace the executor configuration.
    pub fn with_config(mut self, config: GenerativeConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute a generative function definition.
    pub async fn execute(
        &self,
        definition: &FunctionDefinition,
        input: Value,
        context: &ExecutionContext,
    ) -> Result<FunctionResult, EngineError> {
        let TierSpec::Generative(generative) = &definition.tier else {
            return Err(EngineError::invalid_input(format!(
                "definition {} is not a generative function",
                definition.id
            )));
        };

        let started_at = Utc::now();
        let wall_start = Instant::now();
        let execution_id = ExecutionId::generate();
        let input_size_bytes = json_size_bytes(&input);

        let assembler = Assembler {
            definition,
            execution_id,
            started_at,
            context,
            input_size_bytes,
        };

        // Model resolution and templating both happen before any
        // provider traffic; their failures fold into failed results.
        let resolved = match resolve_model(
            generative.model.as_deref(),
            self.config.gemini_configured,
        ) {
            Ok(resolved) => resolved,
            Err(e) => {
                return Ok(assembler.failed(
                    provider_error_to_serialized(&e),
                    wall_start,
                    empty_execution(generative, "", None),
                    0,
                ))
            }
        };

        let system = match &generative.system_prompt {
            Some(template) => match render_template(template, &input) {
                Ok(rendered) => Some(rendered),
                Err(e) => {
                    return Ok(assembler.failed(
                        (&e).into(),
                        wall_start,
                        empty_execution(generative, &resolved.id, None),
                        0,
                    ))
                }
            },
            None => None,
        };
        let user = match render_template(&generative.user_prompt, &input) {
            Ok(rendered) => rendered,
            Err(e) => {
                return Ok(assembler.failed(
                    (&e).into(),
                    wall_start,
                    empty_execution(generative, &resolved.id, system),
                    0,
                ))
            }
        };
        let prompt = PromptRecord {
            system: system.clone(),
            user: user.clone(),
        };

        // Cache lookup short-circuits the provider entirely.
        let cache_key = content_hash(&format!(
            "{}:{}:{}:{}",
            definition.id,
            resolved.id,
            system.as_deref().unwrap_or(""),
            user
        ));
        if self.config.cache_enabled {
            if let Some(cache) = &self.cache {
                if let Some(entry) = cache.get(&cache_key).await {
                    debug!(function = %definition.id, "generative result cache hit");
                    return Ok(assembler.completed(
                        entry.get("output").cloned().unwrap_or(Value::Null),
                        wall_start,
                        GenerativeExecution {
                            model: resolved.id.clone(),
                            tokens: TokenUsage::default(),
                            prompt,
                            raw_response: entry
                                .get("rawResponse")
                                .and_then(Value::as_str)
                                .map(str::to_owned),
                            cached: true,
                            stop_reason: entry
                                .get("stopReason")
                                .and_then(Value::as_str)
                                .unwrap_or("end_turn")
                                .to_string(),
                            model_latency_ms: 0,
                        },
                        0,
                    ));
                }
            }
        }

        let messages = build_messages(generative, &input, &user)?;
        let request = ProviderRequest {
            model: Some(resolved.id.clone()),
            messages,
            tools: vec![],
            max_tokens: generative.max_tokens,
            temperature: generative.temperature,
            system: system.clone(),
        };

        let timeout = resolve_timeout(definition, context)?;
        let max_attempts = definition
            .retry_policy
            .as_ref()
            .and_then(|p| p.max_attempts)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);

        let deadline = tokio::time::sleep(timeout.to_std());
        tokio::pin!(deadline);

        let mut total_tokens = TokenUsage::default();
        let mut retry_count = 0u32;
        let mut schema_retries = 0u32;
        let mut model_latency_ms = 0u64;

        loop {
            if context.cancel.is_cancelled() {
                return Ok(assembler.cancelled(
                    wall_start,
                    execution_record(
                        &resolved.id,
                        total_tokens,
                        prompt.clone(),
                        None,
                        "end_turn",
                        model_latency_ms,
                    ),
                    retry_count,
                ));
            }

            let call_start = Instant::now();
            let call = call_with_retry(&self.provider, &request, max_attempts);
            let called = tokio::select! {
                biased;
                _ = context.cancel.cancelled() => {
                    return Ok(assembler.cancelled(
                        wall_start,
                        execution_record(&resolved.id, total_tokens, prompt.clone(), None, "end_turn", model_latency_ms),
                        retry_count,
                    ));
                }
                _ = &mut deadline => {
                    return Ok(assembler.timed_out(
                        timeout,
                        wall_start,
                        execution_record(&resolved.id, total_tokens, prompt.clone(), None, "end_turn", model_latency_ms),
                        retry_count,
                    ));
                }
                called = call => called,
            };
            model_latency_ms = call_start.elapsed().as_millis() as u64;

            let retried = match called {
                Ok(retried) => retried,
                Err(e) => {
                    return Ok(assembler.failed(
                        provider_error_to_serialized(&e),
                        wall_start,
                        execution_record(
                            &resolved.id,
                            total_tokens,
                            prompt.clone(),
                            None,
                            "end_turn",
                            model_latency_ms,
                        ),
                        retry_count,
                    ))
                }
            };
            retry_count += retried.retry_count;
            total_tokens = total_tokens.add(&retried.response.usage);
            let raw = retried.response.text();
            let stop_reason = retried.response.stop_reason;

            let validated = match (parse_model_output(&raw), &definition.output_schema) {
                (Ok(parsed), Some(schema)) => match strata_schema::validate(&parsed, schema) {
                    Ok(coerced) => Ok(coerced),
                    Err(e) => Err(e.to_string()),
                },
                (Err(e), Some(_)) => Err(format!("output is not valid JSON: {e}")),
                (Ok(parsed), None) => Ok(parsed),
                // Without a schema, non-JSON output passes through as
                // raw text.
                (Err(_), None) => Ok(Value::String(raw.clone())),
            };

            match validated {
                Ok(output) => {
                    let record = execution_record(
                        &resolved.id,
                        total_tokens,
                        prompt.clone(),
                        Some(raw.clone()),
                        stop_reason.as_str(),
                        model_latency_ms,
                    );
                    if self.config.cache_enabled {
                        if let Some(cache) = &self.cache {
                            cache
                                .put(
                                    &cache_key,
                                    json!({
                                        "output": output,
                                        "rawResponse": raw,
                                        "stopReason": stop_reason.as_str(),
                                    }),
                                )
                                .await;
                        }
                    }
                    return Ok(assembler.completed(output, wall_start, record, retry_count));
                }
                Err(reason) if schema_retries < SCHEMA_RETRY_LIMIT => {
                    debug!(function = %definition.id, reason, "invalid output, retrying prompt");
                    schema_retries += 1;
                    retry_count += 1;
                }
                Err(reason) => {
                    return Ok(assembler.failed(
                        SerializedError {
                            name: ErrorKind::ValidationError.name().into(),
                            message: format!("Output validation failed: {reason}"),
                            code: None,
                            stack: None,
                            retryable: false,
                            partial_result: None,
                        },
                        wall_start,
                        execution_record(
                            &resolved.id,
                            total_tokens,
                            prompt.clone(),
                            Some(raw),
                            stop_reason.as_str(),
                            model_latency_ms,
                        ),
                        retry_count,
                    ))
                }
            }
        }
    }
}

/// Resolve the effective timeout: caller, then definition, then the
/// 30-second default.
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

/// Few-shot pairs then the rendered user prompt.
fn build_messages(
    generative: &GenerativeFunction,
    input: &Value,
    rendered_user: &str,
) -> Result<Vec<ProviderMessage>, EngineError> {
    let mut messages = Vec::new();
    if let Some(examples) = &generative.examples {
        for example in examples {
            let example_user = render_template(&generative.user_prompt, &example.input)?;
            messages.push(ProviderMessage::user_text(example_user));
            let example_output = match &example.output {
                Value::String(s) => s.clone(),
                other => serde_json::to_string_pretty(other).unwrap_or_default(),
            };
            messages.push(ProviderMessage::assistant_text(example_output));
        }
    }
    messages.push(ProviderMessage::user_text(rendered_user));
    Ok(messages)
}

fn execution_record(
    model: &str,
    tokens: TokenUsage,
    prompt: PromptRecord,
    raw_response: Option<String>,
    stop_reason: &str,
    model_latency_ms: u64,
) -> GenerativeExecution {
    GenerativeExecution {
        model: model.to_string(),
        tokens,
        prompt,
        raw_response,
        cached: false,
        stop_reason: stop_reason.to_string(),
        model_latency_ms,
    }
}

fn empty_execution(
    generative: &GenerativeFunction,
    model: &str,
    system: Option<String>,
) -> GenerativeExecution {
    GenerativeExecution {
        model: model.to_string(),
        tokens: TokenUsage::default(),
        prompt: PromptRecord {
            system,
            user: generative.user_prompt.clone(),
        },
        raw_response: None,
        cached: false,
        stop_reason: "end_turn".into(),
        model_latency_ms: 0,
    }
}

fn provider_error_to_serialized(error: &ProviderError) -> SerializedError {
    let name = match error {
        ProviderError::UnsupportedModel(_) => ErrorKind::UnsupportedModel.name(),
        _ => "Error",
    };
    SerializedError {
        name: name.into(),
        message: error.to_string(),
        code: None,
        stack: None,
        retryable: error.is_retryable(),
        partial_result: None,
    }
}

/// Builds the uniform result for every terminal path.
struct Assembler<'a> {
    definition: &'a FunctionDefinition,
    execution_id: ExecutionId,
    started_at: chrono::DateTime<Utc>,
    context: &'a ExecutionContext,
    input_size_bytes: u64,
}

impl Assembler<'_> {
    fn base(
        &self,
        status: ExecutionStatus,
        output: Option<Value>,
        error: Option<SerializedError>,
        wall_start: Instant,
        execution: GenerativeExecution,
        retry_count: u32,
    ) -> FunctionResult {
        let duration_ms = wall_start.elapsed().as_millis() as u64;
        let completed_at = self.started_at + chrono::Duration::milliseconds(duration_ms as i64);
        let output_size_bytes = output.as_ref().map(json_size_bytes).unwrap_or(0);
        let tokens = execution.tokens;
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
                retry_count,
                tokens: Some(tokens),
                compute_units: None,
            },
            metadata: ExecutionMetadata {
                started_at: self.started_at,
                completed_at: Some(completed_at),
                trace_id: self.context.trace_id.clone(),
                span_id: self.context.span_id.clone(),
                triggered_by: self.context.triggered_by.clone(),
                workflow_context: self.context.workflow_context.clone(),
            },
            execution: Some(TierExecution::GenerativeExecution(execution)),
        }
    }

    fn completed(
        &self,
        output: Value,
        wall_start: Instant,
        execution: GenerativeExecution,
        retry_count: u32,
    ) -> FunctionResult {
        self.base(
            ExecutionStatus::Completed,
            Some(output),
            None,
            wall_start,
            execution,
            retry_count,
        )
    }

    fn failed(
        &self,
        error: SerializedError,
        wall_start: Instant,
        execution: GenerativeExecution,
        retry_count: u32,
    ) -> FunctionResult {
        self.base(
            ExecutionStatus::Failed,
            None,
            Some(error),
            wall_start,
            execution,
            retry_count,
        )
    }

    fn timed_out(
        &self,
        timeout: DurationMs,
        wall_start: Instant,
        execution: GenerativeExecution,
        retry_count: u32,
    ) -> FunctionResult {
        self.base(
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
            execution,
            retry_count,
        )
    }

    fn cancelled(
        &self,
        wall_start: Instant,
        execution: GenerativeExecution,
        retry_count: u32,
    ) -> FunctionResult {
        self.base(
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
            execution,
            retry_count,
        )
    }
}
