//! Data Fetching Layer
//!
//! Cache-first, rate-limit aware access to external data providers.
//!
//! ## Modules
//!
//! - `cache`: SQLite-backed immutable response cache keyed by request fingerprint
//! - `retry`: Bounded retry state machine and the cache-first `RetryingFetcher`
//! - `http`: reqwest-based provider with compliance headers and request pacing

mod cache;
mod http;
mod retry;

pub use cache::{CacheStats, FetchCache};
pub use http::HttpProvider;
pub use retry::{RetryDecision, RetryPolicy, RetryState, RetryingFetcher};

pub use crate::types::{ErrorCategory, ErrorClassifier, FetchError};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Fetch Request
// =============================================================================

/// Complete description of one provider call
///
/// Everything that affects the response belongs here. Compliance metadata
/// (contact headers, API keys) is attached by the provider and never appears
/// in the request, so it never reaches the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchRequest {
    /// Registered provider name
    pub provider: String,
    /// Absolute endpoint URL
    pub url: String,
    /// Query parameters, kept sorted
    pub params: BTreeMap<String, String>,
    /// Staleness bucket (e.g. UTC date for daily data)
    pub bucket: Option<String>,
}

impl FetchRequest {
    pub fn new(provider: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            url: url.into(),
            params: BTreeMap::new(),
            bucket: None,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Bucket by the current UTC date so the entry refreshes daily
    pub fn daily(self) -> Self {
        let today = chrono::Utc::now().date_naive().to_string();
        self.bucket(today)
    }

    /// Deterministic SHA-256 fingerprint of provider, URL, sorted parameters
    /// and bucket, as lowercase hex.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        // Length prefixes keep ("ab","c") and ("a","bc") apart
        let mut feed = |part: &str| {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        };
        feed(&self.provider);
        feed(&self.url);
        for (key, value) in &self.params {
            feed(key);
            feed(value);
        }
        match &self.bucket {
            Some(bucket) => {
                feed("bucket");
                feed(bucket);
            }
            None => feed("nobucket"),
        }

        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Endpoint URL with query parameters applied
    pub fn to_url(&self) -> std::result::Result<url::Url, FetchError> {
        url::Url::parse_with_params(&self.url, self.params.iter()).map_err(|e| {
            FetchError::with_provider(
                ErrorCategory::BadRequest,
                format!("invalid URL {}: {}", self.url, e),
                self.provider.clone(),
            )
        })
    }
}

// =============================================================================
// Provider Trait
// =============================================================================

/// One external data source
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name requests use to address this provider
    fn name(&self) -> &str;

    /// Perform a single network call; retries happen in the fetcher
    async fn call(&self, request: &FetchRequest) -> std::result::Result<Value, FetchError>;
}

/// Shared provider type for concurrent access across steps.
pub type SharedProvider = Arc<dyn Provider>;
