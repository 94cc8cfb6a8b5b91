//! Stable duration type and human-readable duration parsing.
//!
//! [`DurationMs`] serializes as a plain integer (milliseconds), not as
//! serde's internal `{"secs": N, "nanos": N}` format. This gives a
//! stable, portable wire format. [`DurationSpec`] is the accepting
//! position: definitions may carry either a bare millisecond count or a
//! string such as `"30s"` or `"5 minutes"`.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Duration in milliseconds with a stable JSON serialization format.
///
/// Serializes as a plain `u64` integer representing milliseconds.
///
/// # Examples
///
/// ```
/// use tier0::DurationMs;
///
/// let d = DurationMs::from_millis(1500);
/// assert_eq!(d.as_millis(), 1500);
///
/// let json = serde_json::to_string(&d).unwrap();
/// assert_eq!(json, "1500");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DurationMs(u64);

impl DurationMs {
    /// Zero duration.
    pub const ZERO: Self = Self(0);

    /// Create from milliseconds.
    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Create from seconds.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Get the value in milliseconds.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Convert to `std::time::Duration`.
    pub fn to_std(&self) -> Duration {
        Duration::from_millis(self.0)
    }

    /// Saturating subtraction.
    pub fn saturating_sub(&self, other: DurationMs) -> DurationMs {
        Self(self.0.saturating_sub(other.0))
    }
}

impl From<Duration> for DurationMs {
    fn from(d: Duration) -> Self {
        Self(d.as_millis() as u64)
    }
}

impl From<DurationMs> for Duration {
    fn from(d: DurationMs) -> Self {
        Duration::from_millis(d.0)
    }
}

impl Default for DurationMs {
    fn default() -> Self {
        Self::ZERO
    }
}

impl std::fmt::Display for DurationMs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A duration as accepted from a function definition: either a bare
/// millisecond count or a human-readable string such as `"100ms"`,
/// `"30s"`, `"5 minutes"`, `"2h"`, `"1 day"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationSpec {
    /// Milliseconds, already numeric.
    Millis(u64),
    /// Human-readable string form.
    Text(String),
}

impl DurationSpec {
    /// Resolve this spec to milliseconds. See [`parse_duration`].
    pub fn resolve(&self) -> Result<DurationMs, EngineError> {
        match self {
            DurationSpec::Millis(ms) => Ok(DurationMs::from_millis(*ms)),
            DurationSpec::Text(s) => parse_duration(s),
        }
    }
}

impl From<u64> for DurationSpec {
    fn from(ms: u64) -> Self {
        DurationSpec::Millis(ms)
    }
}

impl From<&str> for DurationSpec {
    fn from(s: &str) -> Self {
        DurationSpec::Text(s.to_owned())
    }
}

/// Multiplier for a duration unit token, or None if unrecognized.
fn unit_millis(unit: &str) -> Option<u64> {
    match unit {
        "ms" => Some(1),
        "s" | "sec" | "secs" | "second" | "seconds" => Some(1_000),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(60_000),
        "h" | "hour" | "hours" => Some(3_600_000),
        "d" | "day" | "days" => Some(86_400_000),
        _ => None,
    }
}

/// Parse a human-readable duration string to integer milliseconds.
///
/// The accepted grammar is `<digits><optional space><unit>` where the
/// unit is one of `ms`, `s`/`seconds`, `m`/`minutes`, `h`/`hours`,
/// `d`/`days` (full and abbreviated). A string of bare digits is taken
/// as milliseconds. Anything else fails with
/// [`ErrorKind::InvalidInput`](crate::ErrorKind::InvalidInput).
///
/// # Examples
///
/// ```
/// use tier0::parse_duration;
///
/// assert_eq!(parse_duration("100ms").unwrap().as_millis(), 100);
/// assert_eq!(parse_duration("30s").unwrap().as_millis(), 30_000);
/// assert_eq!(parse_duration("5 minutes").unwrap().as_millis(), 300_000);
/// assert!(parse_duration("-5s").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<DurationMs, EngineError> {
    let trimmed = input.trim();
    let digits_end = trimmed
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());

    if digits_end == 0 {
        return Err(EngineError::invalid_input(format!(
            "invalid duration: {input:?}"
        )));
    }

    let value: u64 = trimmed[..digits_end].parse().map_err(|_| {
        EngineError::invalid_input(format!("invalid duration magnitude: {input:?}"))
    })?;

    let unit = trimmed[digits_end..].trim_start();
    if unit.is_empty() {
        // Bare digits are already milliseconds.
        return Ok(DurationMs::from_millis(value));
    }

    match unit_millis(unit) {
        Some(mult) => Ok(DurationMs::from_millis(value.saturating_mul(mult))),
        None => Err(EngineError::invalid_input(format!(
            "invalid duration unit: {input:?}"
        ))),
    }
}
