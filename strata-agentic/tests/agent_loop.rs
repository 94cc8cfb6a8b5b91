//! Agent loop integration tests against a scripted mock provider.

use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use strata_agentic::{AgenticConfig, AgenticExecutor};
use strata_model::{
    ContentPart, Provider, ProviderError, ProviderRequest, ProviderResponse, StopReason,
};
use strata_tool::{ApprovalDecision, ApprovalPolicy, FnTool, ToolError, ToolRegistry};
use tier0::{
    AgenticFunction, DurationMs, ExecutionContext, ExecutionStatus, FunctionDefinition,
    TierExecution, TierSpec, TokenUsage, ToolDefinition,
};

// -- Mock Provider --

struct MockProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    call_count: Arc<AtomicUsize>,
    hang: bool,
}

impl MockProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(vec![]),
            call_count: Arc::new(AtomicUsize::new(0)),
            hang: false,
        }
    }

    fn hanging() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(vec![]),
            call_count: Arc::new(AtomicUsize::new(0)),
            hang: true,
        }
    }
}

impl Provider for MockProvider {
    fn complete(
        &self,
        request: ProviderRequest,
    ) -> impl std::future::Future<Output = Result<ProviderResponse, ProviderError>> + Send {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let next = if self.hang {
            None
        } else {
            Some(
                self.responses
                    .lock()
                    .unwrap()
                    .pop_front()
                    .expect("MockProvider: no more responses queued"),
            )
        };
        async move {
            match next {
                Some(response) => Ok(response),
                None => std::future::pending().await,
            }
        }
    }
}

// -- Response helpers --

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: vec![ContentPart::Text { text: text.into() }],
        stop_reason: StopReason::EndTurn,
        usage: TokenUsage::new(10, 5),
        model: "claude-3-sonnet-20240229".into(),
    }
}

fn tool_response(calls: Vec<(&str, &str, Value)>) -> ProviderResponse {
    ProviderResponse {
        content: calls
            .into_iter()
            .map(|(id, name, input)| ContentPart::ToolUse {
                id: id.into(),
                name: name.into(),
                input,
            })
            .collect(),
        stop_reason: StopReason::ToolUse,
        usage: TokenUsage::new(10, 15),
        model: "claude-3-sonnet-20240229".into(),
    }
}

// -- Tool helpers --

fn calc_tool() -> Arc<dyn strata_tool::ToolDyn> {
    Arc::new(FnTool::new("calc", |input: Value| async move {
        let a = input.get("a").and_then(Value::as_i64).unwrap_or(0);
        let b = input.get("b").and_then(Value::as_i64).unwrap_or(0);
        Ok(json!(a + b))
    }))
}

fn done_tool() -> Arc<dyn strata_tool::ToolDyn> {
    Arc::new(FnTool::new("done", |_input: Value| async move {
        Ok(json!("ok"))
    }))
}

fn fail_tool() -> Arc<dyn strata_tool::ToolDyn> {
    Arc::new(FnTool::new("fail", |_input: Value| async move {
        Err::<Value, _>(ToolError::ExecutionFailed("always fails".into()))
    }))
}

fn tool_def(name: &str, required: &[&str]) -> ToolDefinition {
    ToolDefinition {
        name: name.into(),
        description: format!("{name} tool"),
        input_schema: Some(json!({
            "type": "object",
            "required": required,
        })),
    }
}

fn definition(tools: Vec<ToolDefinition>) -> FunctionDefinition {
    FunctionDefinition::new(
        "fn_agent",
        "agent",
        "1.0.0",
        TierSpec::Agentic(AgenticFunction {
            system_prompt: Some("You are a careful assistant.".into()),
            goal: "Compute the requested value.".into(),
            tools,
            max_iterations: None,
            max_tool_calls_per_iteration: None,
            enable_memory: None,
            enable_reasoning: None,
            model: Some("claude-3-sonnet".into()),
        }),
    )
}

fn agentic(result: &tier0::FunctionResult) -> &tier0::AgenticExecution {
    match result.execution.as_ref().unwrap() {
        TierExecution::AgenticExecution(a) => a,
        other => panic!("expected agentic execution, got {other:?}"),
    }
}

fn registry(tools: Vec<Arc<dyn strata_tool::ToolDyn>>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool);
    }
    registry
}

// -- Tests --

#[tokio::test]
async fn tool_loop_achieves_goal() {
    let provider = MockProvider::new(vec![
        tool_response(vec![("tu_1", "calc", json!({"a": 2, "b": 3}))]),
        text_response("{\"result\":5}"),
    ]);
    let executor = AgenticExecutor::new(provider, registry(vec![calc_tool(), done_tool()]));

    let result = executor
        .execute(
            &definition(vec![tool_def("calc", &[]), tool_def("done", &[])]),
            json!({"a": 2, "b": 3}),
            &ExecutionContext::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.output, Some(json!({"result": 5})));
    let a = agentic(&result);
    assert!(a.goal_achieved);
    assert_eq!(a.iterations, 2);
    assert_eq!(a.trace.len(), 2);
    assert_eq!(a.trace[0].tool_calls[0].output, Some(json!(5)));
    assert!(a.trace[0].tool_calls[0].success);
    assert_eq!(a.tools_used, vec!["calc"]);
}

#[tokio::test]
async fn token_accounting_matches_trace() {
    let provider = MockProvider::new(vec![
        tool_response(vec![("tu_1", "calc", json!({"a": 1, "b": 1}))]),
        text_response("done"),
    ]);
    let executor = AgenticExecutor::new(provider, registry(vec![calc_tool()]));

    let result = executor
        .execute(
            &definition(vec![tool_def("calc", &[])]),
            json!({}),
            &ExecutionContext::new(),
        )
        .await
        .unwrap();

    let a = agentic(&result);
    assert_eq!(a.iterations as usize, a.trace.len());
    let summed: u64 = a.trace.iter().map(|i| i.tokens.total_tokens).sum();
    assert_eq!(a.total_tokens, summed);
    assert_eq!(result.metrics.tokens.unwrap().total_tokens, summed);
}

#[tokio::test]
async fn unknown_tool_is_recorded_not_fatal() {
    let provider = MockProvider::new(vec![
        tool_response(vec![("tu_1", "ghost", json!({}))]),
        text_response("recovered"),
    ]);
    let executor = AgenticExecutor::new(provider, registry(vec![calc_tool()]));

    let result = executor
        .execute(
            &definition(vec![tool_def("calc", &[])]),
            json!({}),
            &ExecutionContext::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    let a = agentic(&result);
    let record = &a.trace[0].tool_calls[0];
    assert!(!record.success);
    assert_eq!(
        record.error.as_deref(),
        Some("Tool 'ghost' not found — no handler registered")
    );
}

#[tokio::test]
async fn declared_but_unbound_tool_message() {
    let provider = MockProvider::new(vec![
        tool_response(vec![("tu_1", "calc", json!({}))]),
        text_response("recovered"),
    ]);
    // calc is declared but no handler registered.
    let executor = AgenticExecutor::new(provider, ToolRegistry::new());

    let result = executor
        .execute(
            &definition(vec![tool_def("calc", &[])]),
            json!({}),
            &ExecutionContext::new(),
        )
        .await
        .unwrap();

    let a = agentic(&result);
    assert_eq!(
        a.trace[0].tool_calls[0].error.as_deref(),
        Some("No handler registered for tool 'calc'")
    );
}

#[tokio::test]
async fn input_validation_failure_message() {
    let provider = MockProvider::new(vec![
        tool_response(vec![("tu_1", "calc", json!({"a": 2}))]),
        text_response("recovered"),
    ]);
    let executor = AgenticExecutor::new(provider, registry(vec![calc_tool()]));

    let result = executor
        .execute(
            &definition(vec![tool_def("calc", &["a", "b"])]),
            json!({}),
            &ExecutionContext::new(),
        )
        .await
        .unwrap();

    let a = agentic(&result);
    assert_eq!(
        a.trace[0].tool_calls[0].error.as_deref(),
        Some("Input validation failed: Missing required field: b (validation error)")
    );
}

#[tokio::test]
async fn parallel_fan_out_preserves_all_records() {
    let provider = MockProvider::new(vec![
        tool_response(vec![
            ("tu_1", "calc", json!({"a": 1, "b": 1})),
            ("tu_2", "calc", json!({"a": 2, "b": 2})),
            ("tu_3", "fail", json!({})),
        ]),
        text_response("done"),
    ]);
    let executor = AgenticExecutor::new(provider, registry(vec![calc_tool(), fail_tool()]));

    let result = executor
        .execute(
            &definition(vec![tool_def("calc", &[]), tool_def("fail", &[])]),
            json!({}),
            &ExecutionContext::new(),
        )
        .await
        .unwrap();

    let a = agentic(&result);
    let calls = &a.trace[0].tool_calls;
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].output, Some(json!(2)));
    assert_eq!(calls[1].output, Some(json!(4)));
    assert!(!calls[2].success);
    assert!(calls[2].error.as_deref().unwrap().contains("always fails"));
}

#[tokio::test]
async fn excess_tool_calls_queue_without_model_call() {
    let mut def = definition(vec![tool_def("calc", &[])]);
    if let TierSpec::Agentic(a) = &mut def.tier {
        a.max_tool_calls_per_iteration = Some(2);
    }

    let provider = MockProvider::new(vec![
        tool_response(vec![
            ("tu_1", "calc", json!({"a": 1, "b": 0})),
            ("tu_2", "calc", json!({"a": 2, "b": 0})),
            ("tu_3", "calc", json!({"a": 3, "b": 0})),
        ]),
        text_response("done"),
    ]);
    let call_count = provider.call_count.clone();
    let executor = AgenticExecutor::new(provider, registry(vec![calc_tool()]));

    let result = executor
        .execute(&def, json!({}), &ExecutionContext::new())
        .await
        .unwrap();

    let a = agentic(&result);
    // Iteration 1 runs two calls; iteration 2 is synthetic and serves
    // the queued third; iteration 3 is the closing model turn.
    assert_eq!(a.iterations, 3);
    assert_eq!(a.trace[0].tool_calls.len(), 2);
    assert_eq!(a.trace[1].tool_calls.len(), 1);
    assert_eq!(a.trace[1].tokens, TokenUsage::default());
    assert_eq!(call_count.load(Ordering::SeqCst), 2);
    assert!(a.goal_achieved);
}

#[tokio::test]
async fn budget_exceeded_before_commit() {
    let provider = MockProvider::new(vec![
        tool_response(vec![("tu_1", "calc", json!({"a": 1, "b": 1}))]),
        text_response("this response busts the budget"),
    ]);
    let executor = AgenticExecutor::new(provider, registry(vec![calc_tool()])).with_config(
        AgenticConfig {
            // First response costs 25; a second 15-token response would
            // cross the line.
            token_budget: Some(30),
            ..AgenticConfig::default()
        },
    );

    let result = executor
        .execute(
            &definition(vec![tool_def("calc", &[])]),
            json!({}),
            &ExecutionContext::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    let error = result.error.clone().unwrap();
    assert_eq!(error.name, "BudgetExceeded");
    let a = agentic(&result);
    assert!(a.total_tokens <= 30);
    assert_eq!(a.iterations, 1);
}

#[tokio::test]
async fn max_iterations_terminates() {
    let mut def = definition(vec![tool_def("calc", &[])]);
    if let TierSpec::Agentic(a) = &mut def.tier {
        a.max_iterations = Some(2);
    }
    let provider = MockProvider::new(vec![
        tool_response(vec![("tu_1", "calc", json!({"a": 1, "b": 1}))]),
        tool_response(vec![("tu_2", "calc", json!({"a": 2, "b": 2}))]),
    ]);
    let executor = AgenticExecutor::new(provider, registry(vec![calc_tool()]));

    let result = executor
        .execute(&def, json!({}), &ExecutionContext::new())
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    let a = agentic(&result);
    assert!(!a.goal_achieved);
    assert_eq!(a.iterations, 2);
}

#[tokio::test]
async fn approval_denied_records_and_continues() {
    let provider = MockProvider::new(vec![
        tool_response(vec![("tu_1", "file_write", json!({"path": "/tmp/x"}))]),
        text_response("acknowledged the denial"),
    ]);
    let file_write: Arc<dyn strata_tool::ToolDyn> =
        Arc::new(FnTool::new("file_write", |_input: Value| async move {
            Ok(json!("written"))
        }));
    let executor = AgenticExecutor::new(provider, registry(vec![file_write])).with_config(
        AgenticConfig {
            require_approval: ApprovalPolicy {
                tools: vec!["file_write".into()],
                actions: vec![],
            },
            ..AgenticConfig::default()
        },
    );
    let broker = executor.approvals().clone();

    let denier = tokio::spawn(async move {
        // Wait for the call to park, then deny it. The execution id is
        // generated per run, so discover it via the pending queue.
        let (execution_id, tool_name) = loop {
            if let Some(key) = broker.pending_keys().await.into_iter().next() {
                break key;
            }
            tokio::task::yield_now().await;
        };
        broker
            .approve_tool_call(
                &execution_id,
                &tool_name,
                ApprovalDecision {
                    granted: false,
                    approved_by: Some("security@example.com".into()),
                },
            )
            .await;
    });

    let result = executor
        .execute(
            &definition(vec![tool_def("file_write", &[])]),
            json!({}),
            &ExecutionContext::new(),
        )
        .await
        .unwrap();
    denier.await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    let a = agentic(&result);
    let record = &a.trace[0].tool_calls[0];
    let approval = record.approval.as_ref().unwrap();
    assert!(approval.required);
    assert_eq!(approval.granted, Some(false));
    assert_eq!(record.error.as_deref(), Some("Approval denied"));
    assert!(!record.success);
    assert!(a.tools_used.is_empty());
}

#[tokio::test]
async fn approval_timeout_denies() {
    let provider = MockProvider::new(vec![
        tool_response(vec![("tu_1", "file_write", json!({}))]),
        text_response("moved on"),
    ]);
    let file_write: Arc<dyn strata_tool::ToolDyn> =
        Arc::new(FnTool::new("file_write", |_input: Value| async move {
            Ok(json!("written"))
        }));
    let executor = AgenticExecutor::new(provider, registry(vec![file_write])).with_config(
        AgenticConfig {
            require_approval: ApprovalPolicy {
                tools: vec!["file_write".into()],
                actions: vec![],
            },
            approval_timeout: Some(DurationMs::from_millis(50)),
            ..AgenticConfig::default()
        },
    );

    let result = executor
        .execute(
            &definition(vec![tool_def("file_write", &[])]),
            json!({}),
            &ExecutionContext::new(),
        )
        .await
        .unwrap();

    let record = &agentic(&result).trace[0].tool_calls[0];
    assert_eq!(record.error.as_deref(), Some("Approval timeout"));
    assert_eq!(record.approval.as_ref().unwrap().granted, Some(false));
}

#[tokio::test]
async fn hanging_model_times_out() {
    let executor = AgenticExecutor::new(MockProvider::hanging(), ToolRegistry::new());
    let mut def = definition(vec![]);
    def.timeout = Some("100ms".into());

    let result = executor
        .execute(&def, json!({}), &ExecutionContext::new())
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert_eq!(result.error.unwrap().name, "TimeoutError");
    assert!(result.output.is_none());
}

#[tokio::test]
async fn cancellation_stops_the_loop() {
    let executor = AgenticExecutor::new(MockProvider::hanging(), ToolRegistry::new());
    let context = ExecutionContext::new();
    let cancel = context.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let result = executor
        .execute(&definition(vec![]), json!({}), &context)
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Cancelled);
}

#[tokio::test]
async fn memory_mode_accumulates_conversation() {
    let mut def = definition(vec![tool_def("calc", &[])]);
    if let TierSpec::Agentic(a) = &mut def.tier {
        a.enable_memory = Some(true);
    }

    let provider = MockProvider::new(vec![
        tool_response(vec![("tu_1", "calc", json!({"a": 1, "b": 2}))]),
        text_response("3"),
    ]);
    let executor = AgenticExecutor::new(provider, registry(vec![calc_tool()]));

    executor
        .execute(&def, json!({}), &ExecutionContext::new())
        .await
        .unwrap();

    let requests = executor.provider().requests.lock().unwrap();
    // Second request carries goal, assistant tool_use, and tool results.
    assert_eq!(requests[0].messages.len(), 1);
    assert_eq!(requests[1].messages.len(), 3);
}

#[tokio::test]
async fn reasoning_is_collected_into_summary() {
    let provider = MockProvider::new(vec![ProviderResponse {
        content: vec![
            ContentPart::Thinking {
                thinking: "The input is already complete.".into(),
            },
            ContentPart::Text {
                text: "\"done\"".into(),
            },
        ],
        stop_reason: StopReason::EndTurn,
        usage: TokenUsage::new(5, 5),
        model: "claude-3-sonnet-20240229".into(),
    }]);
    let executor = AgenticExecutor::new(provider, ToolRegistry::new());

    let result = executor
        .execute(&definition(vec![]), json!({}), &ExecutionContext::new())
        .await
        .unwrap();

    let a = agentic(&result);
    assert_eq!(
        a.reasoning_summary.as_deref(),
        Some("The input is already complete.")
    );
    assert_eq!(
        a.trace[0].reasoning.as_deref(),
        Some("The input is already complete.")
    );
    assert_eq!(result.output, Some(json!("done")));
}
