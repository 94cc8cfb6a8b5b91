//! The agent loop state machine.

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Instant;
use strata_model::{
    estimate_cost, resolve_model, ContentPart, Provider, ProviderError, ProviderMessage,
    ProviderRequest, ProviderResponse, Role, StopReason, ToolSchema,
};
use strata_tool::{validate_input, ApprovalBroker, ApprovalPolicy, ToolRegistry};
use tier0::{
    json_size_bytes, AgentIteration, AgenticExecution, AgenticFunction, DurationMs, EngineError,
    ErrorKind, ExecutionContext, ExecutionId, ExecutionMetadata, ExecutionMetrics,
    ExecutionStatus, FunctionDefinition, FunctionResult, SerializedError, TierExecution, TierSpec,
    TokenUsage, ToolCallRecord, ToolDefinition,
};
use tracing::{debug, warn};

/// Default iteration cap.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
/// Default per-iteration tool-call cap; excess calls queue.
pub const DEFAULT_MAX_TOOL_CALLS_PER_ITERATION: u32 = 5;
/// Default agentic timeout: five minutes.
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;

/// Executor-level configuration.
#[derive(Debug, Clone, Default)]
pub struct AgenticConfig {
    /// Upper bound on total tokens; the loop halts rather than
    /// throttles when the next response would exceed it.
    pub token_budget: Option<u64>,
    /// Which tool calls must pass the approval gate.
    pub require_approval: ApprovalPolicy,
    /// How long a parked call waits before it is denied.
    pub approval_timeout: Option<DurationMs>,
}

/// The agentic-tier executor, generic over the provider.
pub struct AgenticExecutor<P: Provider> {
    provider: P,
    tools: ToolRegistry,
    approvals: ApprovalBroker,
    config: AgenticConfig,
}

/// How the loop left its driving cycle.
enum LoopExit {
    GoalAchieved,
    MaxIterations,
    Timeout,
    Cancelled,
    BudgetExceeded { needed: u64, budget: u64 },
    ModelError(ProviderError),
}

/// Mutable state carried across iterations.
struct LoopState {
    memory: Vec<ProviderMessage>,
    latest_user: ProviderMessage,
    pending_results: Vec<ContentPart>,
    queued_calls: VecDeque<(String, String, Value)>,
    total_tokens: TokenUsage,
    trace: Vec<AgentIteration>,
    tools_used: Vec<String>,
    reasoning: Vec<String>,
    last_text: String,
}

impl<P: Provider> AgenticExecutor<P> {
    /// Build an executor over a provider and a tool registry.
    pub fn new(provider: P, tools: ToolRegistry) -> Self {
        Self {
            provider,
            tools,
            approvals: ApprovalBroker::new(),
            config: AgenticConfig::default(),
        }
    }

    /// Replace the executor configuration.
    pub fn with_config(mut self, config: AgenticConfig) -> Self {
        self.config = config;
        self
    }

    /// The approval broker: external callers resolve parked tool calls
    /// through it (`approve_tool_call`).
    pub fn approvals(&self) -> &ApprovalBroker {
        &self.approvals
    }

    /// The underlying provider (inspection and test wiring).
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Execute an agentic function definition.
    pub async fn execute(
        &self,
        definition: &FunctionDefinition,
        input: Value,
        context: &ExecutionContext,
    ) -> Result<FunctionResult, EngineError> {
        let TierSpec::Agentic(agentic) = &definition.tier else {
            return Err(EngineError::invalid_input(format!(
                "definition {} is not an agentic function",
                definition.id
            )));
        };

        let started_at = Utc::now();
        let wall_start = Instant::now();
        let execution_id = ExecutionId::generate();
        let input_size_bytes = json_size_bytes(&input);

        let max_iterations = agentic.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        let call_cap = agentic
            .max_tool_calls_per_iteration
            .unwrap_or(DEFAULT_MAX_TOOL_CALLS_PER_ITERATION) as usize;
        let enable_memory = agentic.enable_memory.unwrap_or(false);
        let enable_reasoning = agentic.enable_reasoning.unwrap_or(true);
        let timeout = resolve_timeout(definition, context)?;
        let deadline_at = wall_start + timeout.to_std();

        let resolved = match resolve_model(agentic.model.as_deref(), false) {
            Ok(resolved) => resolved,
            Err(e) => {
                let error = SerializedError {
                    name: ErrorKind::UnsupportedModel.name().into(),
                    message: e.to_string(),
                    code: None,
                    stack: None,
                    retryable: false,
                    partial_result: None,
                };
                return Ok(assemble(
                    definition,
                    execution_id,
                    started_at,
                    wall_start,
                    context,
                    input_size_bytes,
                    ExecutionStatus::Failed,
                    None,
                    Some(error),
                    empty_state(&input, agentic),
                    "unknown",
                    enable_reasoning,
                    false,
                ));
            }
        };

        let tool_schemas: Vec<ToolSchema> = agentic
            .tools
            .iter()
            .map(|t| ToolSchema {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t
                    .input_schema
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({"type": "object"})),
            })
            .collect();

        let mut state = empty_state(&input, agentic);
        let mut goal_achieved = false;
        let mut output: Option<Value> = None;
        debug!(function = %definition.id, execution = %execution_id, model = %resolved.id, "agent loop start");

        let exit = 'driving: {
            for iteration in 1..=max_iterations {
                if context.cancel.is_cancelled() {
                    break 'driving LoopExit::Cancelled;
                }
                if Instant::now() >= deadline_at {
                    break 'driving LoopExit::Timeout;
                }

                let iter_start = Instant::now();
                let iter_timestamp = Utc::now();

                // Think: a queued backlog from the previous iteration is
                // served as a synthetic response; otherwise call the model.
                let response = if !state.queued_calls.is_empty() {
                    synthetic_response(&mut state, call_cap, &resolved.id)
                } else {
                    let request = ProviderRequest {
                        model: Some(resolved.id.clone()),
                        messages: build_messages(&state, enable_memory),
                        tools: tool_schemas.clone(),
                        max_tokens: None,
                        temperature: None,
                        system: agentic.system_prompt.clone(),
                    };

                    let remaining = deadline_at.saturating_duration_since(Instant::now());
                    let called = tokio::select! {
                        biased;
                        _ = context.cancel.cancelled() => break 'driving LoopExit::Cancelled,
                        _ = tokio::time::sleep(remaining) => break 'driving LoopExit::Timeout,
                        called = self.provider.complete(request) => called,
                    };
                    match called {
                        Ok(response) => response,
                        Err(e) => break 'driving LoopExit::ModelError(e),
                    }
                };

                // Budget check happens before the response's tokens are
                // committed to the totals.
                if let Some(budget) = self.config.token_budget {
                    let needed = state.total_tokens.total_tokens + response.usage.total_tokens;
                    if needed > budget {
                        break 'driving LoopExit::BudgetExceeded { needed, budget };
                    }
                }
                state.total_tokens = state.total_tokens.add(&response.usage);

                let iteration_reasoning = if enable_reasoning {
                    response.reasoning()
                } else {
                    None
                };
                if let Some(reasoning) = &iteration_reasoning {
                    state.reasoning.push(reasoning.clone());
                }
                let text = response.text();
                if !text.is_empty() {
                    state.last_text = text;
                }

                if enable_memory {
                    state.memory.push(ProviderMessage {
                        role: Role::Assistant,
                        content: response.content.clone(),
                    });
                }

                // Act: dispatch up to the cap in parallel, queue the rest.
                let mut calls = response.tool_calls();
                let overflow = if calls.len() > call_cap {
                    calls.split_off(call_cap)
                } else {
                    vec![]
                };
                for call in overflow {
                    state.queued_calls.push_back(call);
                }

                let (records, result_parts) = self
                    .run_tool_calls(&execution_id, calls, &agentic.tools, deadline_at)
                    .await;

                for record in &records {
                    if record.success && !state.tools_used.contains(&record.tool) {
                        state.tools_used.push(record.tool.clone());
                    }
                }

                if !result_parts.is_empty() {
                    let results_message = ProviderMessage {
                        role: Role::User,
                        content: result_parts.clone(),
                    };
                    if enable_memory {
                        state.memory.push(results_message);
                    }
                    state.pending_results = result_parts;
                } else {
                    state.pending_results.clear();
                }

                // Observe: commit the iteration to the trace.
                let timed_out_during_tools = Instant::now() >= deadline_at
                    && records.iter().any(|r| {
                        r.error
                            .as_deref()
                            .is_some_and(|e| e.to_lowercase().contains("timed out"))
                    });
                state.trace.push(AgentIteration {
                    iteration,
                    timestamp: iter_timestamp,
                    reasoning: iteration_reasoning,
                    tool_calls: records,
                    tokens: response.usage,
                    duration_ms: iter_start.elapsed().as_millis() as u64,
                });

                if timed_out_during_tools {
                    break 'driving LoopExit::Timeout;
                }

                if response.stop_reason == StopReason::EndTurn && state.queued_calls.is_empty() {
                    goal_achieved = true;
                    output = Some(
                        serde_json::from_str(&state.last_text)
                            .unwrap_or_else(|_| Value::String(state.last_text.clone())),
                    );
                    break 'driving LoopExit::GoalAchieved;
                }
            }
            LoopExit::MaxIterations
        };

        let (status, error) = match exit {
            LoopExit::GoalAchieved | LoopExit::MaxIterations => (ExecutionStatus::Completed, None),
            LoopExit::Timeout => (
                ExecutionStatus::Timeout,
                Some(SerializedError {
                    name: ErrorKind::TimeoutError.name().into(),
                    message: format!("Execution timed out after {}ms", timeout.as_millis()),
                    code: None,
                    stack: None,
                    retryable: false,
                    partial_result: None,
                }),
            ),
            LoopExit::Cancelled => (
                ExecutionStatus::Cancelled,
                Some(SerializedError {
                    name: "Error".into(),
                    message: "Execution was cancelled".into(),
                    code: None,
                    stack: None,
                    retryable: false,
                    partial_result: None,
                }),
            ),
            LoopExit::BudgetExceeded { needed, budget } => (
                ExecutionStatus::Failed,
                Some(SerializedError {
                    name: ErrorKind::BudgetExceeded.name().into(),
                    message: format!(
                        "token budget exceeded: committing the response would use {needed} of {budget}"
                    ),
                    code: None,
                    stack: None,
                    retryable: false,
                    partial_result: None,
                }),
            ),
            LoopExit::ModelError(e) => (
                ExecutionStatus::Failed,
                Some(SerializedError {
                    name: "Error".into(),
                    message: e.to_string(),
                    code: None,
                    stack: None,
                    retryable: e.is_retryable(),
                    partial_result: None,
                }),
            ),
        };

        let output = if status == ExecutionStatus::Completed {
            output.or_else(|| {
                if state.last_text.is_empty() {
                    None
                } else {
                    Some(Value::String(state.last_text.clone()))
                }
            })
        } else {
            None
        };

        Ok(assemble(
            definition,
            execution_id,
            started_at,
            wall_start,
            context,
            input_size_bytes,
            status,
            output,
            error,
            state,
            &resolved.id,
            enable_reasoning,
            goal_achieved,
        ))
    }

    /// Fan one iteration's tool calls out in parallel, preserving
    /// response order in the returned records.
    async fn run_tool_calls(
        &self,
        execution_id: &ExecutionId,
        calls: Vec<(String, String, Value)>,
        declared: &[ToolDefinition],
        deadline_at: Instant,
    ) -> (Vec<ToolCallRecord>, Vec<ContentPart>) {
        let futures = calls.into_iter().map(|(call_id, name, call_input)| {
            let registry = &self.tools;
            let broker = &self.approvals;
            let policy = &self.config.require_approval;
            let approval_timeout = self.config.approval_timeout;
            async move {
                let call_start = Instant::now();
                let mut record = ToolCallRecord {
                    tool: name.clone(),
                    input: call_input.clone(),
                    output: None,
                    duration_ms: 0,
                    success: false,
                    error: None,
                    approval: None,
                };

                let handler = match registry.resolve(&name, declared) {
                    Ok(handler) => Some(handler),
                    Err(e) => {
                        record.error = Some(e.to_string());
                        None
                    }
                };

                if let Some(handler) = handler {
                    let declared_tool = declared.iter().find(|t| t.name == name);
                    let input_ok = match declared_tool {
                        Some(tool) => match validate_input(tool, &call_input) {
                            Ok(()) => true,
                            Err(e) => {
                                record.error = Some(e.to_string());
                                false
                            }
                        },
                        None => true,
                    };

                    let mut approved = true;
                    if input_ok && policy.requires_approval(&name) {
                        let (approval, timed_out) = broker
                            .wait_for_approval(execution_id, &name, approval_timeout)
                            .await;
                        approved = approval.granted == Some(true);
                        record.approval = Some(approval);
                        if !approved {
                            record.error = Some(if timed_out {
                                "Approval timeout".into()
                            } else {
                                "Approval denied".into()
                            });
                        }
                    }

                    if input_ok && approved {
                        let remaining = deadline_at.saturating_duration_since(Instant::now());
                        match tokio::time::timeout(remaining, handler.call(call_input)).await {
                            Ok(Ok(value)) => {
                                record.success = true;
                                record.output = Some(value);
                            }
                            Ok(Err(e)) => {
                                warn!(tool = %name, error = %e, "tool call failed");
                                record.error = Some(e.to_string());
                            }
                            Err(_) => {
                                record.error = Some("Tool execution timed out".into());
                            }
                        }
                    }
                }

                record.duration_ms = call_start.elapsed().as_millis() as u64;
                let content = match (&record.output, &record.error) {
                    (Some(output), _) => {
                        serde_json::to_string(output).unwrap_or_else(|_| "null".into())
                    }
                    (None, Some(error)) => error.clone(),
                    (None, None) => "null".into(),
                };
                let part = ContentPart::ToolResult {
                    tool_use_id: call_id,
                    content,
                    is_error: !record.success,
                };
                (record, part)
            }
        });

        join_all(futures).await.into_iter().unzip()
    }
}

/// Resolve the effective timeout: caller, then definition, then the
/// five-minute default.
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

fn empty_state(input: &Value, agentic: &AgenticFunction) -> LoopState {
    let goal_message = match input {
        Value::Null => agentic.goal.clone(),
        other => format!(
            "{}\n\nInput: {}",
            agentic.goal,
            serde_json::to_string(other).unwrap_or_default()
        ),
    };
    let latest_user = ProviderMessage::user_text(goal_message);
    LoopState {
        memory: vec![latest_user.clone()],
        latest_user,
        pending_results: vec![],
        queued_calls: VecDeque::new(),
        total_tokens: TokenUsage::default(),
        trace: vec![],
        tools_used: vec![],
        reasoning: vec![],
        last_text: String::new(),
    }
}

/// Context assembly: full conversation with memory on; just the latest
/// user message plus the previous tool results with memory off.
fn build_messages(state: &LoopState, enable_memory: bool) -> Vec<ProviderMessage> {
    if enable_memory {
        return state.memory.clone();
    }
    let mut messages = vec![state.latest_user.clone()];
    if !state.pending_results.is_empty() {
        messages.push(ProviderMessage {
            role: Role::User,
            content: state.pending_results.clone(),
        });
    }
    messages
}

/// Serve queued excess tool calls without a model call.
fn synthetic_response(state: &mut LoopState, call_cap: usize, model: &str) -> ProviderResponse {
    let take = state.queued_calls.len().min(call_cap);
    let content = state
        .queued_calls
        .drain(..take)
        .map(|(id, name, input)| ContentPart::ToolUse { id, name, input })
        .collect();
    ProviderResponse {
        content,
        stop_reason: StopReason::ToolUse,
        usage: TokenUsage::default(),
        model: model.to_string(),
    }
}

#[allow(clippy::too_many_arguments)]
fn assemble(
    definition: &FunctionDefinition,
    execution_id: ExecutionId,
    started_at: chrono::DateTime<Utc>,
    wall_start: Instant,
    context: &ExecutionContext,
    input_size_bytes: u64,
    status: ExecutionStatus,
    output: Option<Value>,
    error: Option<SerializedError>,
    state: LoopState,
    model: &str,
    enable_reasoning: bool,
    goal_achieved: bool,
) -> FunctionResult {
    let duration_ms = wall_start.elapsed().as_millis() as u64;
    let completed_at = started_at + chrono::Duration::milliseconds(duration_ms as i64);
    let output_size_bytes = output.as_ref().map(json_size_bytes).unwrap_or(0);

    let reasoning_summary = if enable_reasoning && !state.reasoning.is_empty() {
        Some(state.reasoning.join("\n"))
    } else {
        None
    };

    FunctionResult {
        execution_id,
        function_id: definition.id.clone(),
        function_version: definition.version.clone(),
        status,
        output,
        error,
        metrics: ExecutionMetrics {
            duration_ms,
            input_size_bytes,
            output_size_bytes,
            retry_count: 0,
            tokens: Some(state.total_tokens),
            compute_units: None,
        },
        metadata: ExecutionMetadata {
            started_at,
            completed_at: Some(completed_at),
            trace_id: context.trace_id.clone(),
            span_id: context.span_id.clone(),
            triggered_by: context.triggered_by.clone(),
            workflow_context: context.workflow_context.clone(),
        },
        execution: Some(TierExecution::AgenticExecution(AgenticExecution {
            model: model.to_string(),
            total_tokens: state.total_tokens.total_tokens,
            iterations: state.trace.len() as u32,
            trace: state.trace,
            tools_used: state.tools_used,
            goal_achieved,
            reasoning_summary,
            cost_estimate: estimate_cost(model, &state.total_tokens),
        })),
    }
}
