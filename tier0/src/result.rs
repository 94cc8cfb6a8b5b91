//! The uniform execution result — one shape regardless of tier.
//!
//! Every terminal outcome yields exactly one [`FunctionResult`] with one
//! of the four statuses. Tier-specific detail rides in a flattened
//! augmentation block (`codeExecution` / `generativeExecution` /
//! `agenticExecution` on the wire).

use crate::definition::{IsolateType, Language};
use crate::error::EngineError;
use crate::id::{ExecutionId, FunctionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four terminal outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// The function produced its output.
    Completed,
    /// The function failed; `error` is set.
    Failed,
    /// The wall-clock deadline expired; `error.name = "TimeoutError"`.
    Timeout,
    /// The caller's cancellation signal fired.
    Cancelled,
}

/// The flattened error shape that crosses every isolate boundary.
///
/// Prototype chains do not survive sub-isolate transport, so errors are
/// reduced to this value form before they surface in a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedError {
    /// Stable error name (see [`ErrorKind`](crate::ErrorKind)).
    pub name: String,
    /// Human-readable message.
    pub message: String,
    /// Optional machine-readable sub-code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Stack trace captured at the failure site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Whether retrying might succeed.
    pub retryable: bool,
    /// Partial output the failing handler chose to expose. Extracted by
    /// the code tier into `output` on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_result: Option<Value>,
}

impl From<&EngineError> for SerializedError {
    fn from(e: &EngineError) -> Self {
        Self {
            name: e.kind.name().to_string(),
            message: e.message.clone(),
            code: e.code.clone(),
            stack: e.stack.clone(),
            retryable: e.retryable,
            partial_result: e.partial_result.clone(),
        }
    }
}

impl From<EngineError> for SerializedError {
    fn from(e: EngineError) -> Self {
        (&e).into()
    }
}

/// Token usage for one model call or one accumulated execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Input (prompt) tokens.
    pub input_tokens: u64,
    /// Output (completion) tokens.
    pub output_tokens: u64,
    /// Total tokens.
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Build from input/output counts; total is their sum.
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    /// Element-wise sum.
    pub fn add(&self, other: &TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
        }
    }
}

/// Size, timing, and consumption metrics. Every result carries this.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// UTF-8 length of the JSON-serialized input.
    pub input_size_bytes: u64,
    /// UTF-8 length of the JSON-serialized output.
    pub output_size_bytes: u64,
    /// Number of retries performed (0 = first attempt succeeded).
    pub retry_count: u32,
    /// Token usage, where the tier consumes tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,
    /// Abstract compute units, best-effort.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_units: Option<f64>,
}

/// Identity and tracing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    /// When the execution started.
    pub started_at: DateTime<Utc>,
    /// When the execution reached its terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Distributed trace ID, if the caller supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Span ID within the trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    /// What triggered this execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    /// Opaque workflow context passed through unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_context: Option<Value>,
}

/// Code-tier augmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeExecution {
    /// Source language that ran.
    pub language: Language,
    /// Which isolation backend ran it.
    pub isolate_type: IsolateType,
    /// Peak memory used, best-effort (0 when unavailable).
    pub memory_used_bytes: u64,
    /// CPU time consumed, best-effort (0 when unavailable).
    pub cpu_time_ms: u64,
    /// Whether deterministic mode was active.
    pub deterministic: bool,
    /// Time spent compiling (0 on cache hit).
    pub compilation_time_ms: u64,
    /// Whether the compiled artifact came from cache.
    pub cache_hit: bool,
}

/// The prompts that were actually sent, post-templating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    /// Rendered system prompt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Rendered user prompt.
    pub user: String,
}

/// Generative-tier augmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerativeExecution {
    /// Resolved model identifier.
    pub model: String,
    /// Token usage for the call (zero on cache hit).
    pub tokens: TokenUsage,
    /// The rendered prompts.
    pub prompt: PromptRecord,
    /// The provider's raw text response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    /// Whether the result was served from cache.
    pub cached: bool,
    /// Why generation stopped: `end_turn`, `max_tokens`, `stop_sequence`.
    pub stop_reason: String,
    /// Provider round-trip latency in milliseconds (0 on cache hit).
    pub model_latency_ms: u64,
}

/// Approval outcome attached to a gated tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    /// Whether this call required approval.
    pub required: bool,
    /// The decision, once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted: Option<bool>,
    /// The principal who decided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
}

/// Record of a single tool invocation within an agent iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    /// Tool name.
    pub tool: String,
    /// The input the model supplied.
    pub input: Value,
    /// The tool's output, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// How long the call took.
    pub duration_ms: u64,
    /// Whether the call succeeded.
    pub success: bool,
    /// Error message, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Approval outcome, when the call was gated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalRecord>,
}

/// One entry per agent loop turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIteration {
    /// 1-based iteration number.
    pub iteration: u32,
    /// When the iteration started.
    pub timestamp: DateTime<Utc>,
    /// Reasoning text, when reasoning is enabled and the model produced
    /// any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Tool calls executed this iteration, in response order.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Tokens consumed by this iteration's model call.
    pub tokens: TokenUsage,
    /// Wall-clock duration of the iteration.
    pub duration_ms: u64,
}

/// Agentic-tier augmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgenticExecution {
    /// Resolved model identifier.
    pub model: String,
    /// Sum of all iteration token totals.
    pub total_tokens: u64,
    /// Number of iterations; always equals `trace.len()`.
    pub iterations: u32,
    /// The per-iteration record.
    pub trace: Vec<AgentIteration>,
    /// Distinct tools invoked, in first-use order.
    pub tools_used: Vec<String>,
    /// Whether the loop terminated by achieving its goal.
    pub goal_achieved: bool,
    /// Aggregated reasoning text, when reasoning was enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_summary: Option<String>,
    /// Estimated cost in USD, best-effort.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_estimate: Option<f64>,
}

/// Tier augmentation. Serializes as a single flattened field named for
/// the tier (`codeExecution` / `generativeExecution` / `agenticExecution`).
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TierExecution {
    /// Code-tier detail.
    CodeExecution(CodeExecution),
    /// Generative-tier detail.
    GenerativeExecution(GenerativeExecution),
    /// Agentic-tier detail.
    AgenticExecution(AgenticExecution),
}

/// The uniform execution result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResult {
    /// Unique execution identifier.
    pub execution_id: ExecutionId,
    /// The function that ran.
    pub function_id: FunctionId,
    /// The version of the function that ran.
    pub function_version: String,
    /// Terminal outcome.
    pub status: ExecutionStatus,
    /// Output; present iff completed, or a partial result on code-tier
    /// failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error; present iff not completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SerializedError>,
    /// Size, timing, and consumption metrics.
    pub metrics: ExecutionMetrics,
    /// Identity and tracing metadata.
    pub metadata: ExecutionMetadata,
    /// Tier augmentation.
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<TierExecution>,
}

/// UTF-8 byte length of the JSON serialization of a value. The metric
/// unit for input/output sizes.
pub fn json_size_bytes(value: &Value) -> u64 {
    serde_json::to_string(value).map(|s| s.len() as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;

    fn sample_metadata() -> ExecutionMetadata {
        ExecutionMetadata {
            started_at: Utc::now(),
            completed_at: None,
            trace_id: None,
            span_id: None,
            triggered_by: None,
            workflow_context: None,
        }
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ExecutionStatus::Timeout).unwrap(),
            json!("timeout")
        );
        assert_eq!(
            serde_json::to_value(ExecutionStatus::Completed).unwrap(),
            json!("completed")
        );
    }

    #[test]
    fn tier_execution_flattens_to_named_field() {
        let result = FunctionResult {
            execution_id: ExecutionId::new("exec_1"),
            function_id: FunctionId::new("fn_1"),
            function_version: "1.0.0".into(),
            status: ExecutionStatus::Completed,
            output: Some(json!(5)),
            error: None,
            metrics: ExecutionMetrics::default(),
            metadata: sample_metadata(),
            execution: Some(TierExecution::CodeExecution(CodeExecution {
                language: Language::Javascript,
                isolate_type: IsolateType::V8,
                memory_used_bytes: 0,
                cpu_time_ms: 0,
                deterministic: false,
                compilation_time_ms: 3,
                cache_hit: false,
            })),
        };
        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["codeExecution"]["isolateType"], "v8");
        assert_eq!(v["executionId"], "exec_1");
        let back: FunctionResult = serde_json::from_value(v).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn serialized_error_from_engine_error() {
        let e = crate::EngineError::new(ErrorKind::TimeoutError, "deadline expired")
            .with_stack("at handler")
            .retryable();
        let s: SerializedError = e.into();
        assert_eq!(s.name, "TimeoutError");
        assert!(s.retryable);
        assert_eq!(s.stack.as_deref(), Some("at handler"));
    }

    #[test]
    fn token_usage_sums() {
        let a = TokenUsage::new(10, 5);
        let b = TokenUsage::new(2, 3);
        let c = a.add(&b);
        assert_eq!(c.total_tokens, 20);
        assert_eq!(c.input_tokens, 12);
    }

    #[test]
    fn json_size_counts_utf8_bytes() {
        assert_eq!(json_size_bytes(&json!(5)), 1);
        assert_eq!(json_size_bytes(&json!({"a": 2, "b": 3})), 13);
    }
}
