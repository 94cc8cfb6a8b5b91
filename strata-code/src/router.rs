//! Backend selection and pre-execution policy tripwires.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tier0::{
    Artifact, EngineError, ErrorKind, IsolateType, Language, Sandbox, SandboxConfig,
};

/// Pick the isolation backend for one execution.
///
/// An explicit `sandbox.isolate` override wins; otherwise WASM-family
/// languages route to the loader and everything else to the embedded JS
/// engine. Python always routes to the Python runtime.
pub fn select_isolate(language: Language, config: &SandboxConfig) -> IsolateType {
    if language == Language::Python {
        return IsolateType::Python;
    }
    if let Some(isolate) = config.isolate {
        return isolate;
    }
    if language.is_wasm_family() {
        IsolateType::Wasm
    } else {
        IsolateType::V8
    }
}

static OVERSIZED_ALLOCATION: LazyLock<Regex> = LazyLock::new(|| {
    // Array allocations with 8+ digit lengths or e8+ scientific
    // literals, and giant repeat counts.
    Regex::new(r"new\s+Array\s*\(\s*(?:\d{8,}|\d+(?:\.\d+)?e\+?(?:[89]|\d{2,}))|\.repeat\s*\(\s*(?:\d{8,}|\d+(?:\.\d+)?e\+?(?:[89]|\d{2,}))")
        .expect("valid regex")
});

static INFINITE_ITERATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"while\s*\(\s*(?:true|1)\s*\)|for\s*\(\s*;\s*;\s*\)").expect("valid regex")
});

/// Conservative pre-run policy checks over the artifact text. These are
/// substring heuristics: they reject the obvious violations cheaply
/// before any engine spins up, and the runtime limits catch the rest.
pub fn preflight(artifact: &Artifact, config: &SandboxConfig) -> Result<(), EngineError> {
    let Artifact::Js(code) = artifact else {
        return Ok(());
    };

    if let Some(allowed) = &config.allowed_globals {
        if !allowed.iter().any(|g| g == "setTimeout") && code.contains("setTimeout") {
            return Err(EngineError::new(
                ErrorKind::ReferenceError,
                "setTimeout is not defined",
            ));
        }
    }

    if config.policy.memory_limit_mb.is_some() && OVERSIZED_ALLOCATION.is_match(code) {
        return Err(EngineError::new(
            ErrorKind::MemoryLimit,
            "artifact allocates beyond the configured memory limit",
        ));
    }

    if config.policy.cpu_limit_ms.is_some() && INFINITE_ITERATION.is_match(code) {
        return Err(EngineError::new(
            ErrorKind::CpuLimit,
            "artifact contains an unbounded iteration",
        ));
    }

    Ok(())
}

/// The three isolation backends behind one dispatch point.
#[derive(Default, Clone)]
pub struct SandboxRouter {
    js: Option<Arc<dyn Sandbox>>,
    wasm: Option<Arc<dyn Sandbox>>,
    python: Option<Arc<dyn Sandbox>>,
}

impl SandboxRouter {
    /// A router with no backends; every dispatch fails until one is
    /// attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the embedded JS backend.
    pub fn with_js(mut self, sandbox: Arc<dyn Sandbox>) -> Self {
        self.js = Some(sandbox);
        self
    }

    /// Attach the WASM backend.
    pub fn with_wasm(mut self, sandbox: Arc<dyn Sandbox>) -> Self {
        self.wasm = Some(sandbox);
        self
    }

    /// Attach the Python backend.
    pub fn with_python(mut self, sandbox: Arc<dyn Sandbox>) -> Self {
        self.python = Some(sandbox);
        self
    }

    /// Resolve the backend for an isolate type. Absence is a host
    /// configuration error, thrown rather than folded into a result.
    pub fn backend(&self, isolate: IsolateType) -> Result<&Arc<dyn Sandbox>, EngineError> {
        let (slot, name) = match isolate {
            IsolateType::V8 => (&self.js, "js"),
            IsolateType::Wasm | IsolateType::WorkerLoader => (&self.wasm, "wasm"),
            IsolateType::Python => (&self.python, "python"),
            _ => unreachable!("IsolateType has no other variants in this workspace"),
        };
        slot.as_ref().ok_or_else(|| {
            EngineError::configuration(format!("no {name} sandbox backend is configured"))
        })
    }
}
