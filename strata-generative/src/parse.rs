//! Model output parsing: trim, strip a surrounding markdown fence,
//! parse JSON.

use serde_json::Value;

/// Strip a surrounding markdown code fence (```json ... ``` or a bare
/// ``` ... ```), if present.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string on the opening fence line.
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

/// Parse a model's text output as JSON, tolerating a markdown fence.
pub fn parse_model_output(raw: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(strip_fence(raw))
}
