//! The engine entry point — one call, routed by tier.

use chrono::Utc;
use serde_json::Value;
use strata_agentic::AgenticExecutor;
use strata_code::CodeExecutor;
use strata_generative::GenerativeExecutor;
use strata_model::Provider;
use tier0::{
    json_size_bytes, EngineError, ExecutionContext, ExecutionId, ExecutionMetadata,
    ExecutionMetrics, ExecutionStatus, FunctionDefinition, FunctionResult, SerializedError,
    TierSpec,
};

/// The platform entry point. Holds one executor per tier and routes
/// each invocation by `definition.type`. Tiers never call each other.
///
/// Executors are optional: an engine wired for code-only deployments
/// throws `ConfigurationError` when handed a generative definition.
pub struct Engine<P: Provider> {
    code: Option<CodeExecutor>,
    generative: Option<GenerativeExecutor<P>>,
    agentic: Option<AgenticExecutor<P>>,
}

impl<P: Provider> Engine<P> {
    /// An engine with no tiers wired.
    pub fn new() -> Self {
        Self {
            code: None,
            generative: None,
            agentic: None,
        }
    }

    /// Wire the code tier.
    pub fn with_code(mut self, executor: CodeExecutor) -> Self {
        self.code = Some(executor);
        self
    }

    /// Wire the generative tier.
    pub fn with_generative(mut self, executor: GenerativeExecutor<P>) -> Self {
        self.generative = Some(executor);
        self
    }

    /// Wire the agentic tier.
    pub fn with_agentic(mut self, executor: AgenticExecutor<P>) -> Self {
        self.agentic = Some(executor);
        self
    }

    /// The agentic tier's executor, when wired — its approval broker is
    /// the external resolution surface for gated tool calls.
    pub fn agentic(&self) -> Option<&AgenticExecutor<P>> {
        self.agentic.as_ref()
    }

    /// Execute a function definition with the given input.
    ///
    /// Every terminal outcome is a single [`FunctionResult`] with one
    /// of the four statuses; `Err` is reserved for host programming
    /// errors (an unwired tier, an invalid definition).
    pub async fn execute(
        &self,
        definition: &FunctionDefinition,
        input: Value,
        context: &ExecutionContext,
    ) -> Result<FunctionResult, EngineError> {
        match &definition.tier {
            TierSpec::Code(_) => {
                let executor = self.code.as_ref().ok_or_else(|| {
                    EngineError::configuration("code tier is not wired into this engine")
                })?;
                executor.execute(definition, input, context).await
            }
            TierSpec::Generative(_) => {
                let executor = self.generative.as_ref().ok_or_else(|| {
                    EngineError::configuration("generative tier is not wired into this engine")
                })?;
                executor.execute(definition, input, context).await
            }
            TierSpec::Agentic(_) => {
                let executor = self.agentic.as_ref().ok_or_else(|| {
                    EngineError::configuration("agentic tier is not wired into this engine")
                })?;
                executor.execute(definition, input, context).await
            }
            // The human tier's approval surface is an external
            // collaborator; the engine itself cannot collect approvals.
            TierSpec::Human(_) => Ok(human_tier_result(definition, &input, context)),
            other => Err(EngineError::invalid_input(format!(
                "unknown tier: {}",
                other.name()
            ))),
        }
    }
}

impl<P: Provider> Default for Engine<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// A human definition fails in-engine: the approval surface lives
/// outside the library.
fn human_tier_result(
    definition: &FunctionDefinition,
    input: &Value,
    context: &ExecutionContext,
) -> FunctionResult {
    let started_at = Utc::now();
    FunctionResult {
        execution_id: ExecutionId::generate(),
        function_id: definition.id.clone(),
        function_version: definition.version.clone(),
        status: ExecutionStatus::Failed,
        output: None,
        error: Some(SerializedError {
            name: "ConfigurationError".into(),
            message: "human tier requires an external approval surface; none is wired into this engine"
                .into(),
            code: None,
            stack: None,
            retryable: false,
            partial_result: None,
        }),
        metrics: ExecutionMetrics {
            duration_ms: 0,
            input_size_bytes: json_size_bytes(input),
            output_size_bytes: 0,
            retry_count: 0,
            tokens: None,
            compute_units: None,
        },
        metadata: ExecutionMetadata {
            started_at,
            completed_at: Some(started_at),
            trace_id: context.trace_id.clone(),
            span_id: context.span_id.clone(),
            triggered_by: context.triggered_by.clone(),
            workflow_context: context.workflow_context.clone(),
        },
        execution: None,
    }
}
