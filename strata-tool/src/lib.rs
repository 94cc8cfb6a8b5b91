#![deny(missing_docs)]
//! Tool interface, registry, and approval gate for the agentic tier.
//!
//! Defines the [`ToolDyn`] trait for object-safe tool abstraction,
//! [`ToolRegistry`] for handler lookup against a definition's declared
//! tools, per-call input validation, and the [`ApprovalBroker`] — a
//! message-passing gate that parks gated tool calls until an external
//! principal resolves them.

pub mod approval;

pub use approval::{ApprovalBroker, ApprovalDecision, ApprovalPolicy};

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tier0::ToolDefinition;

/// Errors from tool operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ToolError {
    /// Neither a definition nor a handler exists for the name.
    #[error("Tool '{0}' not found — no handler registered")]
    Unknown(String),

    /// The definition declares the tool but no handler was bound.
    #[error("No handler registered for tool '{0}'")]
    NoHandler(String),

    /// A handler exists but the definition does not declare the tool.
    #[error("Tool '{0}' not found in registered tools")]
    Undeclared(String),

    /// The call input failed validation against the tool's schema.
    #[error("Input validation failed: {0} (validation error)")]
    InvalidInput(String),

    /// Tool execution failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Object-safe trait for tool implementations.
///
/// Any tool source (local function, HTTP endpoint, nested function
/// invocation) implements this trait. Tools are stored as
/// `Arc<dyn ToolDyn>` in [`ToolRegistry`] and are immutable for the
/// lifetime of the executor that registered them.
pub trait ToolDyn: Send + Sync {
    /// The tool's unique name.
    fn name(&self) -> &str;

    /// Execute the tool with the given input.
    fn call(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>>;
}

/// A tool built from a closure; the common registration path.
pub struct FnTool<F> {
    name: String,
    handler: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send + 'static,
{
    /// Wrap a closure as a tool.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F, Fut> ToolDyn for FnTool<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
        Box::pin((self.handler)(input))
    }
}

/// Registry of tool handlers, resolved against a definition's declared
/// tool list.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolDyn>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Overwrites any existing handler with the
    /// same name.
    pub fn register(&mut self, tool: Arc<dyn ToolDyn>) {
        self.handlers.insert(tool.name().to_string(), tool);
    }

    /// Look up a handler by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolDyn>> {
        self.handlers.get(name)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Resolve a call against both the declared tools and the bound
    /// handlers. The three miss shapes carry distinct messages so a
    /// trace reader can tell deployment gaps from model hallucination.
    pub fn resolve(
        &self,
        name: &str,
        declared: &[ToolDefinition],
    ) -> Result<Arc<dyn ToolDyn>, ToolError> {
        let is_declared = declared.iter().any(|t| t.name == name);
        match (is_declared, self.handlers.get(name)) {
            (true, Some(handler)) => Ok(handler.clone()),
            (true, None) => Err(ToolError::NoHandler(name.to_string())),
            (false, Some(_)) => Err(ToolError::Undeclared(name.to_string())),
            (false, None) => Err(ToolError::Unknown(name.to_string())),
        }
    }
}

/// Validate a call input against the tool's declared `required` fields.
pub fn validate_input(
    definition: &ToolDefinition,
    input: &serde_json::Value,
) -> Result<(), ToolError> {
    let Some(schema) = &definition.input_schema else {
        return Ok(());
    };
    if let Some(missing) = strata_schema::first_missing_required(input, schema) {
        return Err(ToolError::InvalidInput(format!(
            "Missing required field: {missing}"
        )));
    }
    Ok(())
}
