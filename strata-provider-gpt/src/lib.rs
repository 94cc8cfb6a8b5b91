#![deny(missing_docs)]
//! GPT Chat Completions provider for strata.
//!
//! Implements the [`strata_model::Provider`] trait over the Chat
//! Completions API. The system prompt is prepended as the first
//! `{role: "system"}` message; tool results travel as `role: "tool"`
//! messages; `finish_reason = "length"` maps to the `max_tokens` stop
//! reason.

mod types;

use strata_model::{
    parse_retry_after, ContentPart, Provider, ProviderError, ProviderRequest, ProviderResponse,
    Role, StopReason,
};
use tier0::TokenUsage;
use types::*;

/// GPT Chat Completions provider.
pub struct GptProvider {
    api_key: String,
    client: reqwest::Client,
    api_url: String,
    org_id: Option<String>,
}

impl GptProvider {
    /// Create a new provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            api_url: "https://api.openai.com/v1/chat/completions".into(),
            org_id: None,
        }
    }

    /// Override the API URL (for testing or proxies).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the organization header for multi-org accounts.
    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    fn build_request(&self, request: &ProviderRequest) -> GptRequest {
        let model = request.model.clone().unwrap_or_else(|| "gpt-4o-mini".into());

        let mut messages: Vec<GptMessage> = Vec::new();

        // System prompt becomes the first system message.
        if let Some(ref system) = request.system {
            messages.push(GptMessage {
                role: "system".into(),
                content: Some(system.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for m in &request.messages {
            match m.role {
                Role::System => {
                    messages.push(GptMessage {
                        role: "system".into(),
                        content: Some(m.text()),
                        tool_calls: None,
                        tool_call_id: None,
                    });
                }
                Role::User => {
                    // Tool results ride as role="tool" messages, ahead of
                    // any remaining user text.
                    let mut user_text = String::new();
                    for part in &m.content {
                        match part {
                            ContentPart::ToolResult {
                                tool_use_id,
                                content,
                                ..
                            } => {
                                messages.push(GptMessage {
                                    role: "tool".into(),
                                    content: Some(content.clone()),
                                    tool_calls: None,
                                    tool_call_id: Some(tool_use_id.clone()),
                                });
                            }
                            ContentPart::Text { text } => user_text.push_str(text),
                            _ => {}
                        }
                    }
                    if !user_text.is_empty() {
                        messages.push(GptMessage {
                            role: "user".into(),
                            content: Some(user_text),
                            tool_calls: None,
                            tool_call_id: None,
                        });
                    }
                }
                Role::Assistant => {
                    let mut tool_calls = Vec::new();
                    let mut text = String::new();
                    for part in &m.content {
                        match part {
                            ContentPart::ToolUse { id, name, input } => {
                                tool_calls.push(GptToolCall {
                                    id: id.clone(),
                                    call_type: "function".into(),
                                    function: GptFunctionCall {
                                        name: name.clone(),
                                        arguments: serde_json::to_string(input)
                                            .unwrap_or_default(),
                                    },
                                });
                            }
                            ContentPart::Text { text: t } => text.push_str(t),
                            _ => {}
                        }
                    }
                    messages.push(GptMessage {
                        role: "assistant".into(),
                        content: if text.is_empty() { None } else { Some(text) },
                        tool_calls: if tool_calls.is_empty() {
                            None
                        } else {
                            Some(tool_calls)
                        },
                        tool_call_id: None,
                    });
                }
            }
        }

        let tools: Vec<GptToolDef> = request
            .tools
            .iter()
            .map(|t| GptToolDef {
                tool_type: "function".into(),
                function: GptFunctionDef {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect();

        GptRequest {
            model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools,
        }
    }

    fn parse_response(&self, response: GptResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("no choices in response".into()))?;

        let mut content: Vec<ContentPart> = Vec::new();
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                content.push(ContentPart::Text { text });
            }
        }
        if let Some(tool_calls) = choice.message.tool_calls {
            for call in tool_calls {
                let input = serde_json::from_str(&call.function.arguments)
                    .unwrap_or(serde_json::Value::Null);
                content.push(ContentPart::ToolUse {
                    id: call.id,
                    name: call.function.name,
                    input,
                });
            }
        }

        let stop_reason = match choice.finish_reason.as_str() {
            "tool_calls" => StopReason::ToolUse,
            // GPT reports truncation as "length".
            "length" => StopReason::MaxTokens,
            "content_filter" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        };

        Ok(ProviderResponse {
            content,
            stop_reason,
            usage: TokenUsage::new(response.usage.prompt_tokens, response.usage.completion_tokens),
            model: response.model,
        })
    }
}

impl Provider for GptProvider {
    fn complete(
        &self,
        request: ProviderRequest,
    ) -> impl std::future::Future<Output = Result<ProviderResponse, ProviderError>> + Send {
        let api_request = self.build_request(&request);
        let mut http_request = self
            .client
            .post(&self.api_url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json");
        if let Some(ref org) = self.org_id {
            http_request = http_request.header("openai-organization", org.clone());
        }
        let http_request = http_request.json(&api_request);

        async move {
            let http_response = http_request
                .send()
                .await
                .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

            let status = http_response.status();
            let retry_after = http_response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(ProviderError::RateLimited { retry_after });
            }
            if status.is_server_error() {
                let body = http_response.text().await.unwrap_or_default();
                return Err(ProviderError::ServerError {
                    status: status.as_u16(),
                    message: body,
                    retry_after,
                });
            }
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                let body = http_response.text().await.unwrap_or_default();
                return Err(ProviderError::AuthFailed(body));
            }
            if !status.is_success() {
                let body = http_response.text().await.unwrap_or_default();
                return Err(ProviderError::RequestFailed(format!(
                    "HTTP {status}: {body}"
                )));
            }

            let api_response: GptResponse = http_response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

            self.parse_response(api_response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_model::ProviderMessage;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: Some("gpt-4o-mini".into()),
            messages: vec![ProviderMessage::user_text("Hi")],
            tools: vec![],
            max_tokens: Some(128),
            temperature: None,
            system: Some("Be brief.".into()),
        }
    }

    #[test]
    fn system_prompt_prepended_as_first_message() {
        let provider = GptProvider::new("k");
        let api_request = provider.build_request(&request());
        assert_eq!(api_request.messages[0].role, "system");
        assert_eq!(api_request.messages[0].content.as_deref(), Some("Be brief."));
        assert_eq!(api_request.messages[1].role, "user");
    }

    #[test]
    fn tool_results_become_tool_messages() {
        let provider = GptProvider::new("k");
        let mut req = request();
        req.messages = vec![ProviderMessage {
            role: Role::User,
            content: vec![
                ContentPart::ToolResult {
                    tool_use_id: "call_1".into(),
                    content: "5".into(),
                    is_error: false,
                },
                ContentPart::Text {
                    text: "continue".into(),
                },
            ],
        }];
        let api_request = provider.build_request(&req);
        // system, tool, user
        assert_eq!(api_request.messages[1].role, "tool");
        assert_eq!(api_request.messages[1].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(api_request.messages[2].role, "user");
    }

    #[tokio::test]
    async fn parses_text_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"content": "hello"},
                    "finish_reason": "stop"
                }],
                "model": "gpt-4o-mini",
                "usage": {"prompt_tokens": 7, "completion_tokens": 2, "total_tokens": 9}
            })))
            .mount(&server)
            .await;

        let provider = GptProvider::new("k").with_url(server.uri());
        let out = provider.complete(request()).await.unwrap();
        assert_eq!(out.text(), "hello");
        assert_eq!(out.stop_reason, StopReason::EndTurn);
        assert_eq!(out.usage.total_tokens, 9);
    }

    #[tokio::test]
    async fn length_finish_reason_maps_to_max_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"content": "truncat"},
                    "finish_reason": "length"
                }],
                "model": "gpt-4o-mini",
                "usage": {"prompt_tokens": 7, "completion_tokens": 128}
            })))
            .mount(&server)
            .await;

        let provider = GptProvider::new("k").with_url(server.uri());
        let out = provider.complete(request()).await.unwrap();
        assert_eq!(out.stop_reason, StopReason::MaxTokens);
    }

    #[tokio::test]
    async fn tool_call_arguments_parse_to_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "calc", "arguments": "{\"a\":2,\"b\":3}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "model": "gpt-4o-mini",
                "usage": {"prompt_tokens": 4, "completion_tokens": 6}
            })))
            .mount(&server)
            .await;

        let provider = GptProvider::new("k").with_url(server.uri());
        let out = provider.complete(request()).await.unwrap();
        assert_eq!(out.stop_reason, StopReason::ToolUse);
        let calls = out.tool_calls();
        assert_eq!(calls[0].1, "calc");
        assert_eq!(calls[0].2, json!({"a": 2, "b": 3}));
    }

    #[tokio::test]
    async fn rate_limit_maps_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
            .mount(&server)
            .await;

        let provider = GptProvider::new("k").with_url(server.uri());
        let err = provider.complete(request()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.retry_after().map(|d| d.as_millis()), Some(1000));
    }
}
