//! Shared helpers for JSON extraction and error logging.
//!
//! ## JSON Extraction Helpers
//!
//! Provider payloads are loosely typed, so the steps read them through:
//! - `json_string` - Extract strings
//! - `json_f64` - Extract numbers, accepting numeric strings
//! - `json_u64` - Extract unsigned integers, accepting numeric strings

use std::fmt::Display;

// =============================================================================
// JSON Value Extraction Helpers
// =============================================================================

/// Extract string from JSON value by key.
#[inline]
pub fn json_string(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(String::from)
}

/// Extract a finite f64 by key. Numeric strings are accepted.
pub fn json_f64(value: &serde_json::Value, key: &str) -> Option<f64> {
    as_f64(value.get(key)?)
}

/// Interpret a JSON value as a finite f64.
pub fn as_f64(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Extract u64 by key. Numeric strings are accepted.
pub fn json_u64(value: &serde_json::Value, key: &str) -> Option<u64> {
    match value.get(key)? {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

// =============================================================================
// Error Utilities
// =============================================================================

/// Discard an error after logging it at warn level.
///
/// Use this instead of `.ok()` when the failure should stay visible.
pub fn log_filter_warn<T, E: Display>(result: Result<T, E>, context: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("{}: {}", context, e);
            None
        }
    }
}
