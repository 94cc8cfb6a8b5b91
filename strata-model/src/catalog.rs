//! The model catalog: identifier acceptance, short-name mapping, and
//! per-model pricing for cost estimates.

use crate::provider::ProviderError;
use tier0::TokenUsage;

/// The default model when a definition names none.
pub const DEFAULT_MODEL: &str = "claude-3-sonnet";

/// Which provider family serves a model.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// Claude Messages API.
    Claude,
    /// GPT Chat Completions API.
    Gpt,
    /// Gemini (accepted only when a Gemini client is configured).
    Gemini,
}

/// A model identifier resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    /// The serving family.
    pub family: ModelFamily,
    /// The concrete identifier to send on the wire.
    pub id: String,
}

/// Claude short names map to dated identifiers.
fn claude_dated_id(name: &str) -> Option<&'static str> {
    match name {
        "claude-3-opus" => Some("claude-3-opus-20240229"),
        "claude-3-sonnet" => Some("claude-3-sonnet-20240229"),
        "claude-3-haiku" => Some("claude-3-haiku-20240307"),
        "claude-4-opus" => Some("claude-opus-4-20250514"),
        "claude-4-sonnet" => Some("claude-sonnet-4-20250514"),
        _ => None,
    }
}

/// Resolve a model identifier to its family and wire id.
///
/// Accepted: the Claude family (short names map to dated ids; dated ids
/// pass through), the GPT family (`gpt-4o`, `gpt-4o-mini`, and other
/// `gpt-` identifiers), and Gemini identifiers when `gemini_configured`
/// is set. Anything else is `UnsupportedModel`.
pub fn resolve_model(
    name: Option<&str>,
    gemini_configured: bool,
) -> Result<ResolvedModel, ProviderError> {
    let name = name.unwrap_or(DEFAULT_MODEL);

    if let Some(dated) = claude_dated_id(name) {
        return Ok(ResolvedModel {
            family: ModelFamily::Claude,
            id: dated.to_string(),
        });
    }
    if name.starts_with("claude-") {
        return Ok(ResolvedModel {
            family: ModelFamily::Claude,
            id: name.to_string(),
        });
    }
    if name.starts_with("gpt-") {
        return Ok(ResolvedModel {
            family: ModelFamily::Gpt,
            id: name.to_string(),
        });
    }
    if name.starts_with("gemini-") {
        if gemini_configured {
            return Ok(ResolvedModel {
                family: ModelFamily::Gemini,
                id: name.to_string(),
            });
        }
        return Err(ProviderError::UnsupportedModel(format!(
            "{name} requires a configured Gemini client"
        )));
    }

    Err(ProviderError::UnsupportedModel(name.to_string()))
}

/// USD prices per million tokens: (input, output).
fn price_per_mtok(model: &str) -> Option<(f64, f64)> {
    if model.starts_with("claude-3-opus") || model.starts_with("claude-opus-4") {
        Some((15.0, 75.0))
    } else if model.starts_with("claude-3-sonnet") || model.starts_with("claude-sonnet-4") {
        Some((3.0, 15.0))
    } else if model.starts_with("claude-3-haiku") {
        Some((0.25, 1.25))
    } else if model == "gpt-4o" {
        Some((2.5, 10.0))
    } else if model == "gpt-4o-mini" {
        Some((0.15, 0.6))
    } else {
        None
    }
}

/// Best-effort USD cost for the given usage. None when the model is not
/// in the price table.
pub fn estimate_cost(model: &str, usage: &TokenUsage) -> Option<f64> {
    let (input, output) = price_per_mtok(model)?;
    Some(
        usage.input_tokens as f64 / 1_000_000.0 * input
            + usage.output_tokens as f64 / 1_000_000.0 * output,
    )
}
