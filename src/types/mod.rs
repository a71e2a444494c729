pub mod error;
pub mod utils;

pub use error::{
    AgentError, ErrorCategory, ErrorClassifier, ExitClass, FetchError, Result, ResultExt,
};
pub use utils::{
    as_f64, json_f64, json_string, json_u64, log_filter_warn,
};

// =============================================================================
// Domain Newtypes
// =============================================================================

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static TICKER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][A-Z0-9]{0,9}([.\-][A-Z0-9]{1,4})?$").expect("valid ticker regex")
});

/// Exchange ticker symbol, normalized to upper case
///
/// Identifies one pipeline run: checkpoints and outputs are keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(String);

impl Ticker {
    /// Parse and normalize a ticker symbol.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_uppercase();
        if !TICKER_PATTERN.is_match(&normalized) {
            return Err(AgentError::Config(format!(
                "invalid ticker symbol '{}'",
                raw.trim()
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Symbol form used by SEC's ticker index (`BRK.B` becomes `BRK-B`)
    pub fn sec_symbol(&self) -> String {
        self.0.replace('.', "-")
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// SEC Central Index Key, always rendered as 10 zero-padded digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cik(u64);

impl Cik {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub fn padded(self) -> String {
        format!("{:010}", self.0)
    }
}

impl fmt::Display for Cik {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.padded())
    }
}

impl From<u64> for Cik {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
