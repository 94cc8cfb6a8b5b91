//! Chat Completions API request/response types.

use serde::{Deserialize, Serialize};

/// Chat Completions request body.
#[derive(Debug, Serialize)]
pub struct GptRequest {
    /// Model identifier.
    pub model: String,
    /// Conversation messages (system prompt first).
    pub messages: Vec<GptMessage>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Tools available to the model.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<GptToolDef>,
}

/// A message in the Chat Completions format.
#[derive(Debug, Serialize, Deserialize)]
pub struct GptMessage {
    /// Role: "system", "user", "assistant", or "tool".
    pub role: String,
    /// Text content; absent on pure tool-call messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls on assistant messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<GptToolCall>>,
    /// On role="tool": which call this responds to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// A tool call on an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GptToolCall {
    /// Call identifier.
    pub id: String,
    /// Always "function".
    #[serde(rename = "type")]
    pub call_type: String,
    /// The function invocation.
    pub function: GptFunctionCall,
}

/// The function part of a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GptFunctionCall {
    /// Function name.
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

/// A tool definition in the Chat Completions format.
#[derive(Debug, Serialize)]
pub struct GptToolDef {
    /// Always "function".
    #[serde(rename = "type")]
    pub tool_type: String,
    /// The function surface.
    pub function: GptFunctionDef,
}

/// Function surface of a tool definition.
#[derive(Debug, Serialize)]
pub struct GptFunctionDef {
    /// Function name.
    pub name: String,
    /// Function description.
    pub description: String,
    /// JSON Schema for the parameters.
    pub parameters: serde_json::Value,
}

/// Chat Completions response body.
#[derive(Debug, Deserialize)]
pub struct GptResponse {
    /// Completion choices; the first is used.
    pub choices: Vec<GptChoice>,
    /// Model that generated the response.
    pub model: String,
    /// Token usage.
    pub usage: GptUsage,
}

/// One completion choice.
#[derive(Debug, Deserialize)]
pub struct GptChoice {
    /// The assistant message.
    pub message: GptChoiceMessage,
    /// Why generation stopped.
    pub finish_reason: String,
}

/// The message inside a choice.
#[derive(Debug, Deserialize)]
pub struct GptChoiceMessage {
    /// Text content.
    pub content: Option<String>,
    /// Tool calls requested by the model.
    #[serde(default)]
    pub tool_calls: Option<Vec<GptToolCall>>,
}

/// Token usage in a Chat Completions response.
#[derive(Debug, Deserialize)]
pub struct GptUsage {
    /// Prompt tokens consumed.
    pub prompt_tokens: u64,
    /// Completion tokens generated.
    pub completion_tokens: u64,
    /// Total tokens.
    #[serde(default)]
    pub total_tokens: u64,
}
