#![deny(missing_docs)]
//! Code-tier orchestration.
//!
//! [`CodeExecutor`] runs the full pipeline — source load, cached
//! compile, backend selection with pre-execution policy tripwires,
//! sandbox dispatch, and uniform result assembly. The three isolation
//! backends plug into [`SandboxRouter`] as [`tier0::Sandbox`]
//! strategies.

pub mod executor;
pub mod router;

pub use executor::{CodeExecutor, DEFAULT_TIMEOUT_MS};
pub use router::{preflight, select_isolate, SandboxRouter};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use strata_compile::{Compiler, SourceLoader};
    use strata_sandbox_js::JsSandbox;
    use tier0::{
        CodeFunction, CodeSource, ExecutionContext, ExecutionStatus, FunctionDefinition, Language,
        SandboxConfig, TierSpec,
    };

    fn js_executor() -> CodeExecutor {
        CodeExecutor::new(
            SourceLoader::new(),
            Compiler::new(),
            SandboxRouter::new().with_js(Arc::new(JsSandbox::new())),
        )
    }

    fn inline_definition(language: Language, code: &str) -> FunctionDefinition {
        FunctionDefinition::new(
            "fn_test",
            "test",
            "1.0.0",
            TierSpec::Code(CodeFunction {
                language,
                source: CodeSource::Inline { code: code.into() },
                sandbox: SandboxConfig::default(),
                default_config: None,
            }),
        )
    }

    #[tokio::test]
    async fn js_add_completes_with_code_augmentation() {
        let executor = js_executor();
        let definition = inline_definition(
            Language::Javascript,
            "export default function handler(x){return x.a + x.b}",
        );
        let result = executor
            .execute(&definition, json!({"a": 2, "b": 3}), &ExecutionContext::new())
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.output, Some(json!(5)));
        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["codeExecution"]["language"], "javascript");
        assert_eq!(v["codeExecution"]["isolateType"], "v8");
        assert_eq!(v["codeExecution"]["cacheHit"], false);
    }

    #[tokio::test]
    async fn typescript_strips_and_runs() {
        let executor = js_executor();
        let definition = inline_definition(
            Language::Typescript,
            "interface X{n:number} export default function handler(i:X):number{return i.n*2}",
        );
        let result = executor
            .execute(&definition, json!({"n": 21}), &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.output, Some(json!(42)));
    }

    #[tokio::test]
    async fn timeout_definition_times_out() {
        let executor = js_executor();
        let mut definition = inline_definition(
            Language::Javascript,
            "export default async function handler(){while(true){}}",
        );
        definition.timeout = Some("100ms".into());

        let result = executor
            .execute(&definition, json!({}), &ExecutionContext::new())
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Timeout);
        let error = result.error.unwrap();
        assert_eq!(error.name, "TimeoutError");
        assert!(result.output.is_none());
        assert!(result.metrics.duration_ms >= 100);
    }

    #[tokio::test]
    async fn non_code_definition_is_thrown() {
        let executor = js_executor();
        let definition = FunctionDefinition::new(
            "fn_g",
            "gen",
            "1.0.0",
            TierSpec::Generative(tier0::GenerativeFunction {
                user_prompt: "hi".into(),
                ..Default::default()
            }),
        );
        let err = executor
            .execute(&definition, json!({}), &ExecutionContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, tier0::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn partial_result_surfaces_as_output_on_failure() {
        let executor = js_executor();
        let definition = inline_definition(
            Language::Javascript,
            "export default function handler(){ var e = new Error('broke'); e.partialResult = {done: 2}; throw e; }",
        );
        let result = executor
            .execute(&definition, json!({}), &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.output, Some(json!({"done": 2})));
        assert!(!result.error.unwrap().retryable);
    }

    #[tokio::test]
    async fn default_config_merges_under_input() {
        let executor = js_executor();
        let mut definition = inline_definition(
            Language::Javascript,
            "export default function handler(x){return [x.a, x.b]}",
        );
        if let TierSpec::Code(code) = &mut definition.tier {
            code.default_config = Some(json!({"a": 1, "b": 2}));
        }
        let result = executor
            .execute(&definition, json!({"a": 10}), &ExecutionContext::new())
            .await
            .unwrap();
        // Caller's value wins for a; default fills b.
        assert_eq!(result.output, Some(json!([10, 2])));
    }

    #[tokio::test]
    async fn cancelled_context_cancels() {
        let executor = js_executor();
        let definition = inline_definition(
            Language::Javascript,
            "export default function handler(x){return x}",
        );
        let context = ExecutionContext::new();
        context.cancel.cancel();
        let result = executor
            .execute(&definition, json!(1), &ExecutionContext {
                cancel: context.cancel.clone(),
                ..ExecutionContext::new()
            })
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Cancelled);
    }

    #[tokio::test]
    async fn duration_invariant_holds() {
        let executor = js_executor();
        let definition = inline_definition(
            Language::Javascript,
            "export default function handler(x){return x}",
        );
        let result = executor
            .execute(&definition, json!(1), &ExecutionContext::new())
            .await
            .unwrap();
        let started = result.metadata.started_at;
        let completed = result.metadata.completed_at.unwrap();
        assert_eq!(
            (completed - started).num_milliseconds() as u64,
            result.metrics.duration_ms
        );
    }
}
