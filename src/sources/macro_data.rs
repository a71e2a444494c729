//! Macro indicators from FRED.
//!
//! The API key is attached by the provider, never by the request, so it is
//! not part of the cache fingerprint.

use serde_json::Value;

use crate::config::MacroConfig;
use crate::constants::providers::MACRO;
use crate::fetch::FetchRequest;
use crate::types::as_f64;

/// Latest observation of the configured risk-free series
pub fn risk_free_request(config: &MacroConfig) -> FetchRequest {
    FetchRequest::new(
        MACRO,
        format!("{}/series/observations", config.base_url.trim_end_matches('/')),
    )
    .param("series_id", config.series_id.clone())
    .param("file_type", "json")
    .param("sort_order", "desc")
    .param("limit", "1")
    .daily()
}

/// Why no rate could be read from a FRED response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservationGap {
    /// No observations returned
    Empty,
    /// FRED reports missing values as "."
    Missing,
    /// Value present but not a number
    Unparsable(String),
}

impl std::fmt::Display for ObservationGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "no observations returned"),
            Self::Missing => write!(f, "latest observation is missing"),
            Self::Unparsable(raw) => write!(f, "unparsable observation '{}'", raw),
        }
    }
}

/// Latest observation as a decimal rate (percent / 100)
pub fn parse_latest_rate(payload: &Value) -> Result<f64, ObservationGap> {
    let latest = payload
        .get("observations")
        .and_then(Value::as_array)
        .and_then(|obs| obs.first())
        .ok_or(ObservationGap::Empty)?;

    let value = latest.get("value").ok_or(ObservationGap::Empty)?;
    if value.as_str().is_some_and(|s| s.trim() == ".") {
        return Err(ObservationGap::Missing);
    }

    as_f64(value)
        .map(|percent| percent / 100.0)
        .ok_or_else(|| ObservationGap::Unparsable(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_latest_rate() {
        let payload = json!({"observations": [{"date": "2026-01-02", "value": "4.25"}]});
        assert!((parse_latest_rate(&payload).unwrap() - 0.0425).abs() < 1e-12);
    }

    #[test]
    fn test_missing_and_empty_observations() {
        assert_eq!(
            parse_latest_rate(&json!({"observations": [{"value": "."}]})),
            Err(ObservationGap::Missing)
        );
        assert_eq!(
            parse_latest_rate(&json!({"observations": []})),
            Err(ObservationGap::Empty)
        );
        assert!(matches!(
            parse_latest_rate(&json!({"observations": [{"value": "n/a"}]})),
            Err(ObservationGap::Unparsable(_))
        ));
    }

    #[test]
    fn test_request_excludes_api_key() {
        let config = MacroConfig {
            api_key: Some("secret".to_string()),
            ..MacroConfig::default()
        };
        let request = risk_free_request(&config);
        assert_eq!(request.params.get("series_id").map(String::as_str), Some("DGS10"));
        assert!(!request.params.contains_key("api_key"));
        assert!(request.bucket.is_some());
    }
}
