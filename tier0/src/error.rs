//! The stable error taxonomy shared by every tier.
//!
//! Every terminal failure surfaces one of the [`ErrorKind`] names in the
//! result's `error.name` field; callers branch on those strings, so the
//! set is append-only. [`EngineError`] is the host-side carrier: tiers
//! either convert it into a failed result (user-space failures) or
//! return it from the engine API (host programming errors such as a
//! missing collaborator binding).

use serde_json::Value;
use thiserror::Error;

/// The stable error classification. `name()` values are wire format.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed duration, unknown language, unknown source-type.
    InvalidInput,
    /// A required collaborator binding is missing.
    ConfigurationError,
    /// Source resolution found nothing at the referenced key.
    SourceNotFound,
    /// Source resolution failed transiently (e.g. non-2xx fetch).
    SourceUnavailable,
    /// Compile-time failure.
    CompilationError,
    /// Parse-time failure in user code.
    SyntaxError,
    /// Disallowed global reference.
    ReferenceError,
    /// Pre-execution memory tripwire.
    MemoryLimit,
    /// Pre-execution CPU tripwire.
    CpuLimit,
    /// Wall-clock deadline expired. Always paired with `status=timeout`.
    TimeoutError,
    /// WASM execution failed.
    WasmExecutionError,
    /// WASM binary could not be decoded.
    WasmDecodeError,
    /// WASM binary could not be located.
    WasmNotFoundError,
    /// Python user code raised; the Python type name is in the message.
    PythonError,
    /// The Python runtime itself failed.
    PythonExecutionError,
    /// Schema validation failed.
    ValidationError,
    /// A prompt template referenced a variable missing from the input.
    MissingVariable,
    /// Agent token budget exhausted.
    BudgetExceeded,
    /// Model identifier not accepted by any configured provider.
    UnsupportedModel,
    /// Anything else.
    Generic,
}

impl ErrorKind {
    /// The stable wire name for this kind.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::ConfigurationError => "ConfigurationError",
            ErrorKind::SourceNotFound => "SourceNotFound",
            ErrorKind::SourceUnavailable => "SourceUnavailable",
            ErrorKind::CompilationError => "CompilationError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::MemoryLimit => "MemoryLimit",
            ErrorKind::CpuLimit => "CpuLimit",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::WasmExecutionError => "WasmExecutionError",
            ErrorKind::WasmDecodeError => "WasmDecodeError",
            ErrorKind::WasmNotFoundError => "WasmNotFoundError",
            ErrorKind::PythonError => "PythonError",
            ErrorKind::PythonExecutionError => "PythonExecutionError",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::MissingVariable => "MissingVariable",
            ErrorKind::BudgetExceeded => "BudgetExceeded",
            ErrorKind::UnsupportedModel => "UnsupportedModel",
            ErrorKind::Generic => "Error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A classified engine failure.
///
/// Carries everything needed to flatten into the wire-format error
/// object: the stable kind, a message, and the optional `code`, `stack`,
/// `retryable`, and `partial_result` fields that must survive isolate
/// boundaries.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    /// Stable classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Optional machine-readable sub-code.
    pub code: Option<String>,
    /// Stack trace captured at the failure site, if any.
    pub stack: Option<String>,
    /// Whether retrying the whole execution might succeed.
    pub retryable: bool,
    /// Partial output the failing handler chose to expose.
    pub partial_result: Option<Value>,
}

impl EngineError {
    /// Create an error of the given kind with a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            stack: None,
            retryable: false,
            partial_result: None,
        }
    }

    /// Attach a machine-readable sub-code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach a captured stack trace.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Mark the error retryable.
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    /// Attach a partial result exposed by the failing handler.
    pub fn with_partial_result(mut self, value: Value) -> Self {
        self.partial_result = Some(value);
        self
    }

    /// `InvalidInput` shorthand.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    /// `ConfigurationError` shorthand.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigurationError, message)
    }

    /// `TimeoutError` shorthand.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TimeoutError, message)
    }

    /// Whether this error's message mentions a timeout. The code tier
    /// maps such failures to `status=timeout` even when the backend did
    /// not classify them itself.
    pub fn mentions_timeout(&self) -> bool {
        self.kind == ErrorKind::TimeoutError || self.message.to_lowercase().contains("timeout")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        assert_eq!(ErrorKind::TimeoutError.name(), "TimeoutError");
        assert_eq!(ErrorKind::BudgetExceeded.name(), "BudgetExceeded");
        assert_eq!(ErrorKind::Generic.name(), "Error");
        assert_eq!(ErrorKind::WasmDecodeError.name(), "WasmDecodeError");
    }

    #[test]
    fn display_includes_kind_and_message() {
        let e = EngineError::invalid_input("bad duration");
        assert_eq!(e.to_string(), "InvalidInput: bad duration");
    }

    #[test]
    fn timeout_detection_is_case_insensitive() {
        let e = EngineError::new(ErrorKind::Generic, "operation Timeout after 5s");
        assert!(e.mentions_timeout());
        let e = EngineError::new(ErrorKind::Generic, "connection refused");
        assert!(!e.mentions_timeout());
    }

    #[test]
    fn builder_carries_fields() {
        let e = EngineError::new(ErrorKind::PythonError, "ValueError: x")
            .with_code("E42")
            .retryable()
            .with_partial_result(serde_json::json!({"rows": 3}));
        assert!(e.retryable);
        assert_eq!(e.code.as_deref(), Some("E42"));
        assert!(e.partial_result.is_some());
    }
}
