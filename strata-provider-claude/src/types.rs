//! Claude Messages API request/response types.

use serde::{Deserialize, Serialize};

/// Messages API request body.
#[derive(Debug, Serialize)]
pub struct ClaudeRequest {
    /// Model identifier.
    pub model: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Conversation messages.
    pub messages: Vec<ClaudeMessage>,
    /// Optional system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Tools available to the model.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ClaudeTool>,
}

/// A message in the Messages API format.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClaudeMessage {
    /// Role: "user" or "assistant".
    pub role: String,
    /// Message content.
    pub content: ClaudeContent,
}

/// Content can be a string or array of content blocks.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaudeContent {
    /// Simple text string.
    Text(String),
    /// Array of content blocks.
    Blocks(Vec<ClaudeContentBlock>),
}

/// A content block in the Messages API format.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClaudeContentBlock {
    /// Text content.
    #[serde(rename = "text")]
    Text {
        /// The text content.
        text: String,
    },
    /// Extended thinking content.
    #[serde(rename = "thinking")]
    Thinking {
        /// The thinking content.
        thinking: String,
    },
    /// Tool use request.
    #[serde(rename = "tool_use")]
    ToolUse {
        /// Tool use identifier.
        id: String,
        /// Tool name.
        name: String,
        /// Tool input parameters.
        input: serde_json::Value,
    },
    /// Tool result.
    #[serde(rename = "tool_result")]
    ToolResult {
        /// The tool use ID this result is for.
        tool_use_id: String,
        /// The result content.
        content: String,
        /// Whether this result represents an error.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

/// Tool definition for the Messages API.
#[derive(Debug, Serialize)]
pub struct ClaudeTool {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON Schema for the tool input.
    pub input_schema: serde_json::Value,
}

/// Messages API response body.
#[derive(Debug, Deserialize)]
pub struct ClaudeResponse {
    /// Response content blocks.
    pub content: Vec<ClaudeContentBlock>,
    /// Model that generated the response.
    pub model: String,
    /// Stop reason.
    pub stop_reason: String,
    /// Token usage.
    pub usage: ClaudeUsage,
}

/// Token usage in a Messages API response.
#[derive(Debug, Deserialize)]
pub struct ClaudeUsage {
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens generated.
    pub output_tokens: u64,
}
