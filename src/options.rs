use std::time::Duration;

use serde::Deserialize;

use crate::RequestError;

const TIMEOUT_ENV: &str = "HTTP_REQUEST_TIMEOUT_MS";
const RETRIES_ENV: &str = "HTTP_REQUEST_RETRIES";

/// Configures per-attempt timeout and retry budget.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct RequestOptions {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Number of retries after the initial attempt.
    pub retries: u32,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            retries: 3,
        }
    }
}

impl RequestOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Total number of attempts allowed, `retries + 1`.
    pub fn attempt_budget(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Reads options from the environment.
    ///
    /// Reads:
    /// - `HTTP_REQUEST_TIMEOUT_MS`: per-attempt timeout in milliseconds
    /// - `HTTP_REQUEST_RETRIES`: retries after the first attempt
    ///
    /// Unset variables keep their default; unparsable values are an error.
    pub fn from_env() -> Result<Self, RequestError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RequestError> {
        let mut options = Self::default();
        if let Some(raw) = lookup(TIMEOUT_ENV) {
            options.timeout_ms = parse_number(TIMEOUT_ENV, &raw)?;
        }
        if let Some(raw) = lookup(RETRIES_ENV) {
            options.retries = parse_number(RETRIES_ENV, &raw)?;
        }
        Ok(options)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, RequestError> {
    raw.trim()
        .parse()
        .map_err(|_| RequestError::configuration(format!("{key} is not a valid number: '{raw}'")))
}
