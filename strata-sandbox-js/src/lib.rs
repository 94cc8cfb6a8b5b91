#![deny(missing_docs)]
//! Embedded JavaScript isolation backend.
//!
//! Runs a JS artifact's module-default export (or a `handler` function)
//! in a fresh engine context per call. The policy prelude applies
//! determinism, network policy, console capture, and the global
//! allow-list inside the context; all values cross the boundary as
//! JSON text, and thrown errors are flattened to the serialized error
//! shape before surfacing.
//!
//! The evaluation runs on a blocking thread raced against the deadline
//! and the cancellation token. Neither interrupts running user code
//! synchronously; the engine's loop/recursion limits bound stepping.

mod prelude;
mod transform;

pub use prelude::DETERMINISTIC_EPOCH_MS;
pub use transform::bind_handler;

use async_trait::async_trait;
use boa_engine::{Context, Source};
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;
use tier0::{
    Artifact, DurationMs, Sandbox, SandboxConfig, SandboxOutcome, SandboxVerdict, SerializedError,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The embedded JS sandbox.
#[derive(Debug)]
pub struct JsSandbox {
    loop_iteration_limit: u64,
    recursion_limit: usize,
}

impl JsSandbox {
    /// A sandbox with default stepping limits.
    pub fn new() -> Self {
        Self {
            // A runaway loop must still terminate after its caller's
            // deadline race has returned.
            loop_iteration_limit: 50_000_000,
            recursion_limit: 512,
        }
    }

    /// Override the engine loop-iteration limit.
    pub fn with_loop_limit(mut self, limit: u64) -> Self {
        self.loop_iteration_limit = limit;
        self
    }
}

impl Default for JsSandbox {
    fn default() -> Self {
        Self::new()
    }
}

/// The finalize payload produced inside the context.
#[derive(Debug, Deserialize)]
struct EvalReport {
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<JsErrorPayload>,
    #[serde(default)]
    pending: bool,
    #[serde(default)]
    logs: Vec<String>,
}

/// The flattened error as serialized by the in-context finalizer.
#[derive(Debug, Deserialize)]
struct JsErrorPayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    stack: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    retryable: bool,
    #[serde(default, rename = "partialResult")]
    partial_result: Option<Value>,
}

impl From<JsErrorPayload> for SerializedError {
    fn from(p: JsErrorPayload) -> Self {
        SerializedError {
            name: p.name.unwrap_or_else(|| "Error".into()),
            message: p.message.unwrap_or_else(|| "unknown error".into()),
            code: p.code,
            stack: p.stack,
            retryable: p.retryable,
            partial_result: p.partial_result,
        }
    }
}

/// Assemble the full script for one run.
fn build_script(code: &str, input: &Value, config: &SandboxConfig) -> String {
    let prelude = prelude::build_prelude(config);
    let bound = transform::bind_handler(code);
    // Double-encode the input so it embeds as a quoted JS string
    // literal and round-trips through JSON.parse.
    let input_literal = serde_json::to_string(
        &serde_json::to_string(input).unwrap_or_else(|_| "null".into()),
    )
    .unwrap_or_else(|_| "\"null\"".into());

    format!(
        "(function() {{\n\
         {prelude}\n\
         var __handler__;\n\
         {bound}\n\
         if (typeof __handler__ !== 'function' && typeof handler === 'function') {{ __handler__ = handler; }}\n\
         var __out__; var __err__; var __settled__ = false;\n\
         var __input__ = JSON.parse({input_literal});\n\
         try {{\n\
           if (typeof __handler__ !== 'function') {{ throw new ReferenceError('handler is not defined'); }}\n\
           var __r__ = __handler__(__input__);\n\
           if (__r__ && typeof __r__.then === 'function') {{\n\
             __r__.then(function(v) {{ __out__ = v; __settled__ = true; }},\n\
                        function(e) {{ __err__ = e; __settled__ = true; }});\n\
           }} else {{ __out__ = __r__; __settled__ = true; }}\n\
         }} catch (e) {{ __err__ = e; __settled__ = true; }}\n\
         globalThis.__finalize__ = function() {{\n\
           var payload = {{ logs: __logs__ }};\n\
           if (!__settled__) {{ payload.pending = true; }}\n\
           else if (__err__ !== undefined && __err__ !== null) {{\n\
             payload.error = {{\n\
               name: (__err__ && __err__.name) || 'Error',\n\
               message: (__err__ && __err__.message !== undefined) ? __err__.message : String(__err__),\n\
               stack: __err__ && __err__.stack,\n\
               code: (__err__ && __err__.code !== undefined && __err__.code !== null) ? String(__err__.code) : undefined,\n\
               retryable: !!(__err__ && __err__.retryable === true),\n\
               partialResult: __err__ && __err__.partialResult\n\
             }};\n\
           }} else {{\n\
             payload.output = __out__ === undefined ? null : __out__;\n\
           }}\n\
           return JSON.stringify(payload);\n\
         }};\n\
         }})();"
    )
}

/// Run the script to completion on the current thread.
fn evaluate(
    script: &str,
    loop_limit: u64,
    recursion_limit: usize,
) -> (Result<EvalReport, String>, u64) {
    let start = Instant::now();
    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(loop_limit);
    context
        .runtime_limits_mut()
        .set_recursion_limit(recursion_limit);

    let report = (|| {
        context
            .eval(Source::from_bytes(script.as_bytes()))
            .map_err(|e| e.to_string())?;
        // Drain the microtask/job queue so async handlers settle.
        let _ = context.run_jobs();
        let finalized = context
            .eval(Source::from_bytes(b"__finalize__()"))
            .map_err(|e| e.to_string())?;
        let json = finalized
            .to_string(&mut context)
            .map_err(|e| e.to_string())?
            .to_std_string_escaped();
        serde_json::from_str::<EvalReport>(&json)
            .map_err(|e| format!("finalize payload was not valid JSON: {e}"))
    })();

    (report, start.elapsed().as_millis() as u64)
}

/// Classify an engine-level failure string into a serialized error.
fn engine_error(message: String) -> SerializedError {
    let head = message.split(':').next().unwrap_or("").trim();
    let name = if head.ends_with("Error") {
        head.to_string()
    } else if message.to_lowercase().contains("syntax") {
        "SyntaxError".to_string()
    } else if message.to_lowercase().contains("not defined") {
        "ReferenceError".to_string()
    } else {
        "Error".to_string()
    };
    SerializedError {
        name,
        message,
        code: None,
        stack: None,
        retryable: false,
        partial_result: None,
    }
}

#[async_trait]
impl Sandbox for JsSandbox {
    async fn run(
        &self,
        artifact: &Artifact,
        input: &Value,
        policy: &SandboxConfig,
        deadline: DurationMs,
        cancel: &CancellationToken,
    ) -> SandboxOutcome {
        let Artifact::Js(code) = artifact else {
            return SandboxOutcome::failed(SerializedError {
                name: "Error".into(),
                message: "js sandbox received a non-js artifact".into(),
                code: None,
                stack: None,
                retryable: false,
                partial_result: None,
            });
        };

        let script = build_script(code, input, policy);
        let loop_limit = self.loop_iteration_limit;
        let recursion_limit = self.recursion_limit;
        let handle =
            tokio::task::spawn_blocking(move || evaluate(&script, loop_limit, recursion_limit));

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("js evaluation cancelled");
                return SandboxOutcome::from_verdict(SandboxVerdict::Cancelled);
            }
            _ = tokio::time::sleep(deadline.to_std()) => {
                debug!(deadline_ms = deadline.as_millis(), "js evaluation deadline expired");
                return SandboxOutcome::from_verdict(SandboxVerdict::TimedOut);
            }
            joined = handle => joined,
        };

        let (report, cpu_time_ms) = match joined {
            Ok(result) => result,
            Err(join_error) => {
                return SandboxOutcome::failed(engine_error(format!(
                    "evaluation thread failed: {join_error}"
                )))
            }
        };

        let mut outcome = match report {
            Ok(report) => {
                let logs = report.logs;
                let verdict = if let Some(error) = report.error {
                    SandboxVerdict::Failed(error.into())
                } else if report.pending {
                    SandboxVerdict::Failed(SerializedError {
                        name: "Error".into(),
                        message: "handler promise never settled (no timers in this isolate)"
                            .into(),
                        code: None,
                        stack: None,
                        retryable: false,
                        partial_result: None,
                    })
                } else {
                    SandboxVerdict::Completed(report.output.unwrap_or(Value::Null))
                };
                let mut outcome = SandboxOutcome::from_verdict(verdict);
                outcome.logs = logs;
                outcome
            }
            Err(message) => SandboxOutcome::failed(engine_error(message)),
        };

        outcome.cpu_time_ms = cpu_time_ms;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sandbox() -> JsSandbox {
        JsSandbox::new()
    }

    async fn run_js(code: &str, input: Value) -> SandboxOutcome {
        run_js_with(code, input, SandboxConfig::default(), 5_000).await
    }

    async fn run_js_with(
        code: &str,
        input: Value,
        config: SandboxConfig,
        deadline_ms: u64,
    ) -> SandboxOutcome {
        sandbox()
            .run(
                &Artifact::Js(code.to_string()),
                &input,
                &config,
                DurationMs::from_millis(deadline_ms),
                &CancellationToken::new(),
            )
            .await
    }

    #[tokio::test]
    async fn default_export_handler_runs() {
        let outcome = run_js(
            "export default function handler(x){return x.a + x.b}",
            json!({"a": 2, "b": 3}),
        )
        .await;
        assert_eq!(outcome.verdict, SandboxVerdict::Completed(json!(5)));
    }

    #[tokio::test]
    async fn bare_handler_function_runs() {
        let outcome = run_js("function handler(x){return x.n * 2}", json!({"n": 21})).await;
        assert_eq!(outcome.verdict, SandboxVerdict::Completed(json!(42)));
    }

    #[tokio::test]
    async fn arrow_default_runs() {
        let outcome = run_js("export default (x) => x.v", json!({"v": "ok"})).await;
        assert_eq!(outcome.verdict, SandboxVerdict::Completed(json!("ok")));
    }

    #[tokio::test]
    async fn async_handler_is_awaited() {
        let outcome = run_js(
            "export default async function handler(x){return x.a + 1}",
            json!({"a": 41}),
        )
        .await;
        assert_eq!(outcome.verdict, SandboxVerdict::Completed(json!(42)));
    }

    #[tokio::test]
    async fn thrown_error_is_serialized() {
        let outcome = run_js(
            "export default function handler(){ var e = new Error('boom'); e.code = 'E_BOOM'; e.retryable = true; e.partialResult = {rows: 3}; throw e; }",
            json!({}),
        )
        .await;
        match outcome.verdict {
            SandboxVerdict::Failed(error) => {
                assert_eq!(error.name, "Error");
                assert_eq!(error.message, "boom");
                assert_eq!(error.code.as_deref(), Some("E_BOOM"));
                assert!(error.retryable);
                assert_eq!(error.partial_result, Some(json!({"rows": 3})));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_handler_is_reference_error() {
        let outcome = run_js("const x = 1;", json!({})).await;
        match outcome.verdict {
            SandboxVerdict::Failed(error) => {
                assert_eq!(error.name, "ReferenceError");
                assert!(error.message.contains("handler"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn syntax_error_surfaces() {
        let outcome = run_js("export default function handler( {", json!({})).await;
        match outcome.verdict {
            SandboxVerdict::Failed(error) => {
                assert_eq!(error.name, "SyntaxError");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn infinite_loop_times_out() {
        let start = std::time::Instant::now();
        let outcome = run_js_with(
            "export default async function handler(){while(true){}}",
            json!({}),
            SandboxConfig::default(),
            100,
        )
        .await;
        assert_eq!(outcome.verdict, SandboxVerdict::TimedOut);
        assert!(start.elapsed().as_millis() >= 100);
    }

    #[tokio::test]
    async fn cancellation_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = sandbox()
            .run(
                &Artifact::Js("export default (x) => x".into()),
                &json!(1),
                &SandboxConfig::default(),
                DurationMs::from_secs(5),
                &cancel,
            )
            .await;
        assert_eq!(outcome.verdict, SandboxVerdict::Cancelled);
    }

    #[tokio::test]
    async fn deterministic_mode_pins_clock_and_random() {
        let config = SandboxConfig {
            deterministic: true,
            ..SandboxConfig::default()
        };
        let outcome = run_js_with(
            "export default function handler(){ return {now: Date.now(), rand: Math.random()} }",
            json!({}),
            config,
            5_000,
        )
        .await;
        assert_eq!(
            outcome.verdict,
            SandboxVerdict::Completed(json!({"now": 1704067200000u64, "rand": 0.5}))
        );
    }

    #[tokio::test]
    async fn network_disabled_fetch_throws() {
        let outcome = run_js(
            "export default function handler(){ fetch('https://example.com'); }",
            json!({}),
        )
        .await;
        match outcome.verdict {
            SandboxVerdict::Failed(error) => {
                assert_eq!(error.message, "Network access is disabled");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn network_allowlist_blocks_other_hosts() {
        let mut config = SandboxConfig::default();
        config.policy.network_enabled = true;
        config.policy.network_allowlist = vec!["*.trusted.io".into()];
        let outcome = run_js_with(
            "export default function handler(){ fetch('https://evil.example.com/x'); }",
            json!({}),
            config,
            5_000,
        )
        .await;
        match outcome.verdict {
            SandboxVerdict::Failed(error) => {
                assert!(
                    error.message.starts_with("Network access blocked: evil.example.com"),
                    "unexpected message: {}",
                    error.message
                );
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn console_logs_are_collected() {
        let outcome = run_js(
            "export default function handler(){ console.log('step', 1); console.warn('careful'); return null; }",
            json!({}),
        )
        .await;
        assert_eq!(outcome.logs, vec!["step 1".to_string(), "careful".to_string()]);
    }

    #[tokio::test]
    async fn string_input_round_trips() {
        let outcome = run_js(
            "export default function handler(s){ return s + '!' }",
            json!("hello \"quoted\" text"),
        )
        .await;
        assert_eq!(
            outcome.verdict,
            SandboxVerdict::Completed(json!("hello \"quoted\" text!"))
        );
    }
}
