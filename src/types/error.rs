//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//! Provides error classification for retry, fallback and exit-code decisions.
//!
//! ## Error Categories
//!
//! - **RateLimit**: Provider throttling (wait and retry)
//! - **Network**: Connectivity issues and timeouts (retry with backoff)
//! - **Transient**: Provider 5xx responses (retry with backoff)
//! - **NotFound / BadRequest / Auth / Parse**: Permanent (fail fast)
//!
//! ## Exit Classes
//!
//! Every `AgentError` maps to an [`ExitClass`]: resumable failures leave the
//! checkpoint intact for the next invocation, fatal ones need operator action.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Provider failure categories used for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited - wait then retry
    RateLimit,
    /// Network/connectivity issue or timeout - retry with backoff
    Network,
    /// Temporary server issue (5xx) - retry with backoff
    Transient,
    /// Resource does not exist - don't retry
    NotFound,
    /// Invalid request - don't retry, fix request
    BadRequest,
    /// Authentication or authorization failed - don't retry
    Auth,
    /// Response body could not be decoded - don't retry
    Parse,
    /// Unclassified failure - don't retry
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Network => write!(f, "NETWORK"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::Auth => write!(f, "AUTH"),
            Self::Parse => write!(f, "PARSE_ERROR"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Check if a failure in this category is safe to retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Network | Self::Transient)
    }
}

// =============================================================================
// Fetch Error
// =============================================================================

/// Provider failure with category, context and retry hints
#[derive(Debug, Clone)]
pub struct FetchError {
    /// Category for retry routing
    pub category: ErrorCategory,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
    /// Provider-suggested wait before retrying
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
            status: None,
            retry_after: None,
        }
    }

    /// Create error with provider context
    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self::new(category, message).provider(provider)
    }

    /// Add provider context to an existing error
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Add suggested retry delay
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps transport-level failures onto [`ErrorCategory`]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an HTTP status code
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> FetchError {
        let err = match status {
            429 => FetchError::with_provider(ErrorCategory::RateLimit, message, provider),
            401 | 403 => FetchError::with_provider(ErrorCategory::Auth, message, provider),
            404 | 410 => FetchError::with_provider(ErrorCategory::NotFound, message, provider),
            408 => FetchError::with_provider(ErrorCategory::Network, message, provider),
            400..=499 => FetchError::with_provider(ErrorCategory::BadRequest, message, provider),
            500..=599 => FetchError::with_provider(ErrorCategory::Transient, message, provider),
            _ => FetchError::with_provider(ErrorCategory::Unknown, message, provider),
        };
        err.status(status)
    }

    /// Classify a `Retry-After` header value (seconds form only)
    pub fn parse_retry_after(value: &str) -> Option<Duration> {
        value
            .trim()
            .parse::<u64>()
            .ok()
            .map(|secs| Duration::from_secs(secs.min(300)))
    }
}

// =============================================================================
// Exit Classes
// =============================================================================

/// How a failed run should be reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// A step failed but the checkpoint is intact; rerun with resume
    Resumable,
    /// State or configuration is unusable; operator action required
    Fatal,
    /// Stopped on request after saving a checkpoint
    Interrupted,
}

impl ExitClass {
    pub fn code(&self) -> u8 {
        match self {
            Self::Resumable => 1,
            Self::Fatal => 2,
            Self::Interrupted => 130,
        }
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum AgentError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Fetch Errors
    // -------------------------------------------------------------------------
    /// Permanent provider failure, not retried
    #[error("Fetch failed: {0}")]
    Fetch(FetchError),

    #[error("Fetch failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: FetchError },

    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    #[error("Step {step} requires artifact '{artifact}' which is not recorded")]
    Precondition { step: String, artifact: String },

    #[error("Missing mandatory input for {subject}: {message}")]
    MissingArtifact { subject: String, message: String },

    #[error("Malformed artifact {name}: {message}")]
    MalformedArtifact { name: String, message: String },

    #[error("Step {step} failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<AgentError>,
    },

    #[error("Invalid state transition: {0}")]
    StateTransition(String),

    #[error("Interrupted by shutdown request")]
    Interrupted,

    // -------------------------------------------------------------------------
    // Checkpoint Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt checkpoint at {}: {reason} (rerun with --fresh to start over)", path.display())]
    CorruptCheckpoint { path: PathBuf, reason: String },

    #[error("Checkpoint write failed at {}: {reason}", path.display())]
    CheckpointWrite { path: PathBuf, reason: String },

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Valuation error: {0}")]
    Valuation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<FetchError> for AgentError {
    fn from(err: FetchError) -> Self {
        AgentError::Fetch(err)
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return AgentError::Io(std::io::Error::new(io_err.kind(), io_err.to_string()));
        }
        AgentError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl AgentError {
    /// Wrap an error with the step it happened in
    pub fn in_step(self, step: impl Into<String>) -> Self {
        match self {
            // Keep these recognizable to callers matching on them
            Self::Interrupted | Self::CheckpointWrite { .. } | Self::Step { .. } => self,
            other => Self::Step {
                step: step.into(),
                source: Box::new(other),
            },
        }
    }

    pub fn malformed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedArtifact {
            name: name.into(),
            message: message.into(),
        }
    }

    /// The innermost error, with step wrappers removed
    pub fn root(&self) -> &AgentError {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this is a fetch failure (permanent or exhausted) a step may
    /// resolve with a fallback value
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self.root(),
            Self::Fetch(_) | Self::RetriesExhausted { .. }
        )
    }

    /// Whether this error came from a shutdown request
    pub fn is_interrupted(&self) -> bool {
        matches!(self.root(), Self::Interrupted)
    }

    /// Exit classification for the process control surface
    pub fn exit_class(&self) -> ExitClass {
        match self.root() {
            Self::Interrupted => ExitClass::Interrupted,
            Self::Config(_)
            | Self::Precondition { .. }
            | Self::StateTransition(_)
            | Self::CorruptCheckpoint { .. }
            | Self::CheckpointWrite { .. } => ExitClass::Fatal,
            _ => ExitClass::Resumable,
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| AgentError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| AgentError::Storage(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::RateLimit.to_string(), "RATE_LIMIT");
        assert_eq!(ErrorCategory::NotFound.to_string(), "NOT_FOUND");
        assert_eq!(ErrorCategory::Parse.to_string(), "PARSE_ERROR");
    }

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::RateLimit.is_retryable());
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::BadRequest.is_retryable());
        assert!(!ErrorCategory::Auth.is_retryable());
        assert!(!ErrorCategory::Unknown.is_retryable());
    }

    #[test]
    fn test_classify_http_status() {
        let rate_limit = ErrorClassifier::classify_http_status(429, "slow down", "sec");
        assert_eq!(rate_limit.category, ErrorCategory::RateLimit);
        assert_eq!(rate_limit.status, Some(429));

        let missing = ErrorClassifier::classify_http_status(404, "no such CIK", "sec");
        assert_eq!(missing.category, ErrorCategory::NotFound);
        assert!(!missing.is_retryable());

        let unavailable = ErrorClassifier::classify_http_status(503, "maintenance", "fred");
        assert_eq!(unavailable.category, ErrorCategory::Transient);

        let forbidden = ErrorClassifier::classify_http_status(403, "missing user agent", "sec");
        assert_eq!(forbidden.category, ErrorCategory::Auth);

        let teapot = ErrorClassifier::classify_http_status(418, "teapot", "market");
        assert_eq!(teapot.category, ErrorCategory::BadRequest);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(
            ErrorClassifier::parse_retry_after(" 12 "),
            Some(Duration::from_secs(12))
        );
        assert_eq!(
            ErrorClassifier::parse_retry_after("9999"),
            Some(Duration::from_secs(300))
        );
        assert_eq!(
            ErrorClassifier::parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            None
        );
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::with_provider(ErrorCategory::RateLimit, "Too many requests", "sec");
        assert_eq!(err.to_string(), "[sec:RATE_LIMIT] Too many requests");

        let bare = FetchError::new(ErrorCategory::Network, "Connection reset");
        assert_eq!(bare.to_string(), "[NETWORK] Connection reset");
    }

    #[test]
    fn test_exit_class_mapping() {
        let corrupt = AgentError::CorruptCheckpoint {
            path: PathBuf::from("state/XYZ.json"),
            reason: "checksum mismatch".to_string(),
        };
        assert_eq!(corrupt.exit_class(), ExitClass::Fatal);

        let step_failure = AgentError::MissingArtifact {
            subject: "XYZ".to_string(),
            message: "no facts".to_string(),
        }
        .in_step("fetch_raw_data");
        assert_eq!(step_failure.exit_class(), ExitClass::Resumable);

        assert_eq!(AgentError::Interrupted.in_step("x").exit_class(), ExitClass::Interrupted);
        assert_eq!(ExitClass::Fatal.code(), 2);
    }

    #[test]
    fn test_fetch_failure_detection_through_step_wrapper() {
        let exhausted = AgentError::RetriesExhausted {
            attempts: 4,
            last: FetchError::new(ErrorCategory::Transient, "502"),
        }
        .in_step("gather_macro_context");
        assert!(exhausted.is_fetch_failure());
        assert!(!AgentError::Interrupted.is_fetch_failure());
    }
}
