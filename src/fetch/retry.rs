//! Retrying Fetcher
//!
//! Cache-first fetch with a bounded retry state machine:
//!
//! 1. Fingerprint the request; a cache hit returns with no network call
//! 2. Call the provider; success is written to the cache before returning
//! 3. Retryable failures (rate limit, network, 5xx) back off exponentially
//! 4. Permanent failures surface immediately; exhausted retries carry the last error
//!
//! Backoff sleeps race the shutdown signal and return `Interrupted`.

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{FetchCache, FetchRequest, SharedProvider};
use crate::config::FetchConfig;
use crate::shutdown::ShutdownSignal;
use crate::types::{AgentError, ErrorCategory, FetchError, Result};

// =============================================================================
// Retry Policy
// =============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per request, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: f32,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_secs(config.max_delay_secs),
            factor: config.backoff_factor,
            jitter: config.jitter,
        }
    }

    /// Millisecond-scale policy without jitter, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            factor: 2.0,
            jitter: false,
        }
    }

    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .build()
    }
}

// =============================================================================
// Retry State Machine
// =============================================================================

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then make attempt number `attempt`
    Retry { attempt: u32, delay: Duration },
    /// Permanent failure; do not retry
    GiveUp,
    /// Retryable failure but the attempt budget is spent
    Exhausted,
}

/// Attempt counter plus delay schedule for one request
pub struct RetryState {
    max_attempts: u32,
    max_delay: Duration,
    jitter: bool,
    attempts: u32,
    schedule: ExponentialBackoff,
}

impl RetryState {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts.max(1),
            max_delay: policy.max_delay,
            jitter: policy.jitter,
            attempts: 0,
            schedule: policy.schedule(),
        }
    }

    /// Record the start of an attempt; returns its 1-based number
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn on_failure(&mut self, error: &FetchError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::GiveUp;
        }
        if self.attempts >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        let Some(scheduled) = self.schedule.next() else {
            return RetryDecision::Exhausted;
        };

        let delay = match error.retry_after {
            // Provider hint wins when longer than our schedule
            Some(hint) => hint.max(scheduled),
            None if self.jitter => scheduled + random_jitter(scheduled),
            None => scheduled,
        };

        RetryDecision::Retry {
            attempt: self.attempts + 1,
            delay: delay.min(self.max_delay),
        }
    }
}

/// Up to 25% extra delay so concurrent retries spread out
fn random_jitter(base_delay: Duration) -> Duration {
    let max_jitter_ms = (base_delay.as_millis() as u64) / 4;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    let jitter_ms = rand::rng().random_range(0..max_jitter_ms);
    Duration::from_millis(jitter_ms)
}

// =============================================================================
// Retrying Fetcher
// =============================================================================

pub struct RetryingFetcher {
    cache: Arc<FetchCache>,
    providers: HashMap<String, SharedProvider>,
    policy: RetryPolicy,
    shutdown: ShutdownSignal,
    network_calls: AtomicU64,
    cache_hits: AtomicU64,
}

impl RetryingFetcher {
    pub fn new(cache: Arc<FetchCache>, policy: RetryPolicy, shutdown: ShutdownSignal) -> Self {
        Self {
            cache,
            providers: HashMap::new(),
            policy,
            shutdown,
            network_calls: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    pub fn with_provider(mut self, provider: SharedProvider) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Provider calls made so far, retries included
    pub fn network_calls(&self) -> u64 {
        self.network_calls.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    #[instrument(skip_all, fields(provider = %request.provider, url = %request.url))]
    pub async fn fetch(&self, request: &FetchRequest) -> Result<Value> {
        let key = request.fingerprint();

        if let Some(payload) = self.cache.lookup(&key)? {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("cache hit");
            return Ok(payload);
        }

        let provider = self.providers.get(&request.provider).ok_or_else(|| {
            AgentError::Fetch(FetchError::with_provider(
                ErrorCategory::BadRequest,
                "no provider registered under this name",
                request.provider.clone(),
            ))
        })?;

        let mut state = RetryState::new(&self.policy);
        loop {
            if self.shutdown.is_shutdown_requested() {
                return Err(AgentError::Interrupted);
            }

            let attempt = state.begin_attempt();
            self.network_calls.fetch_add(1, Ordering::Relaxed);

            match provider.call(request).await {
                Ok(payload) => {
                    self.cache.store(&key, request, &payload)?;
                    debug!(attempt, "fetched and cached");
                    return Ok(payload);
                }
                Err(error) => match state.on_failure(&error) {
                    RetryDecision::GiveUp => {
                        debug!(attempt, %error, "permanent fetch failure");
                        return Err(AgentError::Fetch(error));
                    }
                    RetryDecision::Exhausted => {
                        warn!(attempt, %error, "retries exhausted");
                        return Err(AgentError::RetriesExhausted {
                            attempts: state.attempts(),
                            last: error,
                        });
                    }
                    RetryDecision::Retry { attempt: next, delay } => {
                        warn!(
                            attempt,
                            next_attempt = next,
                            delay_ms = delay.as_millis() as u64,
                            %error,
                            "retrying fetch"
                        );
                        self.sleep(delay).await?;
                    }
                },
            }
        }
    }

    async fn sleep(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = self.shutdown.cancelled() => Err(AgentError::Interrupted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Provider;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    /// Provider that fails a set number of times before succeeding
    struct FlakyProvider {
        fail_times: u32,
        category: ErrorCategory,
        calls: AtomicU32,
    }

    impl FlakyProvider {
        fn new(fail_times: u32, category: ErrorCategory) -> Arc<Self> {
            Arc::new(Self {
                fail_times,
                category,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn call(&self, _request: &FetchRequest) -> std::result::Result<Value, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(FetchError::with_provider(self.category, "simulated failure", "flaky"))
            } else {
                Ok(json!({"ok": true, "call": n}))
            }
        }
    }

    fn fetcher(provider: Arc<FlakyProvider>, max_attempts: u32) -> RetryingFetcher {
        let cache = Arc::new(FetchCache::open_in_memory().unwrap());
        RetryingFetcher::new(cache, RetryPolicy::immediate(max_attempts), ShutdownSignal::new())
            .with_provider(provider)
    }

    fn request() -> FetchRequest {
        FetchRequest::new("flaky", "https://example.com/data").param("q", "1")
    }

    #[test]
    fn test_state_gives_up_on_permanent() {
        let mut state = RetryState::new(&RetryPolicy::immediate(3));
        state.begin_attempt();
        let err = FetchError::new(ErrorCategory::NotFound, "gone");
        assert_eq!(state.on_failure(&err), RetryDecision::GiveUp);

        let unknown = FetchError::new(ErrorCategory::Unknown, "?");
        assert_eq!(state.on_failure(&unknown), RetryDecision::GiveUp);
    }

    #[test]
    fn test_state_exhausts_after_max_attempts() {
        let mut state = RetryState::new(&RetryPolicy::immediate(2));
        let err = FetchError::new(ErrorCategory::Transient, "503");

        state.begin_attempt();
        assert!(matches!(
            state.on_failure(&err),
            RetryDecision::Retry { attempt: 2, .. }
        ));
        state.begin_attempt();
        assert_eq!(state.on_failure(&err), RetryDecision::Exhausted);
    }

    #[test]
    fn test_retry_after_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
            jitter: false,
        };
        let mut state = RetryState::new(&policy);
        state.begin_attempt();
        let err = FetchError::new(ErrorCategory::RateLimit, "429").retry_after(Duration::from_secs(60));
        assert_eq!(
            state.on_failure(&err),
            RetryDecision::Retry {
                attempt: 2,
                delay: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn test_delays_grow_and_stay_bounded() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            factor: 2.0,
            jitter: false,
        };
        let mut state = RetryState::new(&policy);
        let err = FetchError::new(ErrorCategory::Network, "reset");
        let mut delays = Vec::new();
        loop {
            state.begin_attempt();
            match state.on_failure(&err) {
                RetryDecision::Retry { delay, .. } => delays.push(delay),
                _ => break,
            }
        }
        assert_eq!(delays.len(), 5);
        assert_eq!(delays[0], Duration::from_millis(100));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(500)));
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let provider = FlakyProvider::new(2, ErrorCategory::Transient);
        let fetcher = fetcher(provider.clone(), 4);

        let payload = fetcher.fetch(&request()).await.unwrap();
        assert_eq!(payload["ok"], json!(true));
        assert_eq!(provider.calls(), 3);
        assert_eq!(fetcher.network_calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_single_attempt() {
        let provider = FlakyProvider::new(10, ErrorCategory::NotFound);
        let fetcher = fetcher(provider.clone(), 4);

        let err = fetcher.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, AgentError::Fetch(ref e) if e.category == ErrorCategory::NotFound));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_carries_attempts() {
        let provider = FlakyProvider::new(10, ErrorCategory::RateLimit);
        let fetcher = fetcher(provider.clone(), 3);

        let err = fetcher.fetch(&request()).await.unwrap_err();
        match err {
            AgentError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.category, ErrorCategory::RateLimit);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let provider = FlakyProvider::new(0, ErrorCategory::Transient);
        let fetcher = fetcher(provider.clone(), 3);

        let first = fetcher.fetch(&request()).await.unwrap();
        let second = fetcher.fetch(&request()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);
        assert_eq!(fetcher.cache_hits(), 1);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_permanent() {
        let provider = FlakyProvider::new(0, ErrorCategory::Transient);
        let fetcher = fetcher(provider.clone(), 3);

        let err = fetcher
            .fetch(&FetchRequest::new("nobody", "https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Fetch(ref e) if e.category == ErrorCategory::BadRequest));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_backoff() {
        let provider = FlakyProvider::new(10, ErrorCategory::Transient);
        let shutdown = ShutdownSignal::new();
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
            jitter: false,
        };
        let fetcher = RetryingFetcher::new(
            Arc::new(FetchCache::open_in_memory().unwrap()),
            policy,
            shutdown.clone(),
        )
        .with_provider(provider.clone());

        let trigger = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                shutdown.request_shutdown();
            })
        };

        let result = tokio::time::timeout(Duration::from_secs(5), fetcher.fetch(&request()))
            .await
            .expect("backoff should be interrupted");
        trigger.await.unwrap();

        assert!(matches!(result, Err(AgentError::Interrupted)));
        assert_eq!(provider.calls(), 1);
    }
}
