//! Per-invocation execution context.

use crate::duration::DurationSpec;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Caller-supplied context for one execution.
///
/// The cancellation token is checked at every suspension point; firing
/// it resolves the execution to `status=cancelled` at the next
/// checkpoint. It never interrupts running user code synchronously.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Timeout override; takes precedence over the definition's.
    pub timeout: Option<DurationSpec>,
    /// Cooperative cancellation signal.
    pub cancel: CancellationToken,
    /// What triggered this execution (recorded in metadata).
    pub triggered_by: Option<String>,
    /// Distributed trace ID.
    pub trace_id: Option<String>,
    /// Span ID within the trace.
    pub span_id: Option<String>,
    /// Opaque workflow context, passed through to the result.
    pub workflow_context: Option<Value>,
}

impl ExecutionContext {
    /// A context with no overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout override.
    pub fn with_timeout(mut self, timeout: impl Into<DurationSpec>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// Set the cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set the trigger description.
    pub fn with_triggered_by(mut self, trigger: impl Into<String>) -> Self {
        self.triggered_by = Some(trigger.into());
        self
    }
}
