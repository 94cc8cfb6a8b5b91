#![deny(missing_docs)]
//! Claude Messages API provider for strata.
//!
//! Implements the [`strata_model::Provider`] trait over the Messages
//! API. The system prompt rides in the request's top-level `system`
//! field; rate limits and 5xx responses surface as retryable errors
//! carrying any `Retry-After` suggestion.

mod types;

use strata_model::{
    parse_retry_after, ContentPart, Provider, ProviderError, ProviderRequest, ProviderResponse,
    Role, StopReason,
};
use tier0::TokenUsage;
use types::*;

/// Claude Messages API provider.
pub struct ClaudeProvider {
    api_key: String,
    client: reqwest::Client,
    api_url: String,
    api_version: String,
}

impl ClaudeProvider {
    /// Create a new provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            api_url: "https://api.anthropic.com/v1/messages".into(),
            api_version: "2023-06-01".into(),
        }
    }

    /// Override the API URL (for testing or proxies).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    fn build_request(&self, request: &ProviderRequest) -> ClaudeRequest {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| "claude-3-sonnet-20240229".into());
        let max_tokens = request.max_tokens.unwrap_or(4096);

        let messages: Vec<ClaudeMessage> = request
            .messages
            .iter()
            .map(|m| ClaudeMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    // System messages go in the system field; a stray one
                    // in the list degrades to user.
                    Role::System => "user".into(),
                },
                content: parts_to_claude_content(&m.content),
            })
            .collect();

        let tools: Vec<ClaudeTool> = request
            .tools
            .iter()
            .map(|t| ClaudeTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect();

        ClaudeRequest {
            model,
            max_tokens,
            messages,
            system: request.system.clone(),
            temperature: request.temperature,
            tools,
        }
    }

    fn parse_response(&self, response: ClaudeResponse) -> ProviderResponse {
        let content: Vec<ContentPart> = response
            .content
            .iter()
            .map(claude_block_to_content_part)
            .collect();

        let stop_reason = match response.stop_reason.as_str() {
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        };

        ProviderResponse {
            content,
            stop_reason,
            usage: TokenUsage::new(response.usage.input_tokens, response.usage.output_tokens),
            model: response.model,
        }
    }
}

impl Provider for ClaudeProvider {
    fn complete(
        &self,
        request: ProviderRequest,
    ) -> impl std::future::Future<Output = Result<ProviderResponse, ProviderError>> + Send {
        let api_request = self.build_request(&request);
        let http_request = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .header("content-type", "application/json")
            .json(&api_request);

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

            let api_response: ClaudeResponse = http_response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

            Ok(self.parse_response(api_response))
        }
    }
}

fn parts_to_claude_content(parts: &[ContentPart]) -> ClaudeContent {
    if parts.len() == 1 {
        if let ContentPart::Text { text } = &parts[0] {
            return ClaudeContent::Text(text.clone());
        }
    }
    ClaudeContent::Blocks(parts.iter().map(content_part_to_claude_block).collect())
}

fn content_part_to_claude_block(part: &ContentPart) -> ClaudeContentBlock {
    match part {
        ContentPart::Text { text } => ClaudeContentBlock::Text { text: text.clone() },
        ContentPart::Thinking { thinking } => ClaudeContentBlock::Thinking {
            thinking: thinking.clone(),
        },
        ContentPart::ToolUse { id, name, input } => ClaudeContentBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        },
        ContentPart::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => ClaudeContentBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: content.clone(),
            is_error: *is_error,
        },
    }
}

fn claude_block_to_content_part(block: &ClaudeContentBlock) -> ContentPart {
    match block {
        ClaudeContentBlock::Text { text } => ContentPart::Text { text: text.clone() },
        ClaudeContentBlock::Thinking { thinking } => ContentPart::Thinking {
            thinking: thinking.clone(),
        },
        ClaudeContentBlock::ToolUse { id, name, input } => ContentPart::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        },
        ClaudeContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => ContentPart::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: content.clone(),
            is_error: *is_error,
        },
    }
}
