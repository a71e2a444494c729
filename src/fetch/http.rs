//! HTTP Provider
//!
//! GET-and-decode-JSON provider over reqwest. Sends the configured
//! User-Agent, injects an optional API key at call time and keeps a minimum
//! interval between consecutive requests.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use super::{FetchRequest, Provider};
use crate::types::{AgentError, ErrorCategory, ErrorClassifier, FetchError, Result};

/// Longest error body kept in a `FetchError` message
const MAX_ERROR_BODY: usize = 200;

pub struct HttpProvider {
    name: String,
    client: reqwest::Client,
    /// Query parameter name and secret value
    api_key: Option<(String, SecretString)>,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("name", &self.name)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("min_interval", &self.min_interval)
            .finish()
    }
}

impl HttpProvider {
    pub fn new(name: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| AgentError::Config(format!("Invalid User-Agent header: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            client,
            api_key: None,
            min_interval: Duration::ZERO,
            last_request: Mutex::new(None),
        })
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn with_api_key(mut self, param: impl Into<String>, key: SecretString) -> Self {
        self.api_key = Some((param.into(), key));
        self
    }

    /// Wait until `min_interval` has passed since the previous request
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn classify_transport(&self, err: reqwest::Error) -> FetchError {
        // Request URLs may carry the API key
        let err = err.without_url();
        let category = if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            ErrorCategory::Network
        } else if err.is_decode() {
            ErrorCategory::Parse
        } else {
            ErrorCategory::Unknown
        };
        FetchError::with_provider(category, err.to_string(), self.name.clone())
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, request: &FetchRequest) -> std::result::Result<Value, FetchError> {
        let mut url = request.to_url()?;
        if let Some((param, key)) = &self.api_key {
            url.query_pairs_mut()
                .append_pair(param, key.expose_secret());
        }

        self.throttle().await;
        debug!(provider = %self.name, url = %request.url, "sending request");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(ErrorClassifier::parse_retry_after);
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();

            let mut error = ErrorClassifier::classify_http_status(
                status.as_u16(),
                &format!("HTTP {}: {}", status, snippet.trim()),
                &self.name,
            );
            if let Some(delay) = retry_after {
                error = error.retry_after(delay);
            }
            return Err(error);
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| self.classify_transport(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_key() {
        let provider = HttpProvider::new("macro", "EquityAgent/1.0", Duration::from_secs(5))
            .unwrap()
            .with_api_key("api_key", SecretString::from("super-secret".to_string()));
        let rendered = format!("{:?}", provider);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_rejects_invalid_user_agent() {
        let result = HttpProvider::new("sec", "bad\nagent", Duration::from_secs(5));
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[tokio::test]
    async fn test_throttle_spaces_requests() {
        let provider = HttpProvider::new("sec", "EquityAgent/1.0", Duration::from_secs(5))
            .unwrap()
            .with_min_interval(Duration::from_millis(50));

        let start = Instant::now();
        provider.throttle().await;
        provider.throttle().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_relative_url_is_bad_request() {
        let provider = HttpProvider::new("market", "EquityAgent/1.0", Duration::from_secs(5)).unwrap();
        let err = provider
            .call(&FetchRequest::new("market", "quote"))
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::BadRequest);
    }
}
