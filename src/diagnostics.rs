//! Structured diagnostics emitted by the executor.
//!
//! The executor only decides field content and severity. Destination and
//! formatting belong to the [`Diagnostics`] implementation injected at
//! construction; [`TracingDiagnostics`] forwards to `tracing`.

use std::{collections::BTreeMap, fmt};

pub const METHOD: &str = "http.request.method";
pub const URI: &str = "http.request.uri";
pub const PAYLOAD: &str = "http.request.payload";
pub const HEADERS: &str = "http.request.headers";
pub const ATTEMPT: &str = "http.request.attempt";
pub const ATTEMPTS: &str = "http.request.attempts";
pub const RESPONSE_CODE: &str = "http.response.code";
pub const RESPONSE_PAYLOAD: &str = "http.response.payload";
pub const ERROR: &str = "error";

/// Severity of a diagnostic record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// Loggable value kinds accepted at the diagnostics boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Str(String),
    Number(i64),
    Map(BTreeMap<String, String>),
    Error(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(value) | Self::Error(value) => f.write_str(value),
            Self::Number(value) => write!(f, "{value}"),
            Self::Map(map) => {
                f.write_str("{")?;
                for (index, (key, value)) in map.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<BTreeMap<String, String>> for FieldValue {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self::Map(value)
    }
}

/// Ordered, string-keyed field set attached to one diagnostic record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn error(self, err: &dyn std::error::Error) -> Self {
        self.with(ERROR, FieldValue::Error(err.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Sink for structured diagnostics. Implementations must be thread-safe.
pub trait Diagnostics: Send + Sync {
    fn log(&self, level: Level, message: &str, fields: &Fields);
}

/// Forwards records to the `tracing` dispatcher under the
/// `resilient_request` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDiagnostics;

macro_rules! emit {
    ($level:expr, $message:expr, $fields:expr) => {{
        let field = |key: &str| $fields.get(key).map(tracing::field::display);
        tracing::event!(
            target: "resilient_request",
            $level,
            http.request.method = field(METHOD),
            http.request.uri = field(URI),
            http.request.payload = field(PAYLOAD),
            http.request.headers = field(HEADERS),
            http.request.attempt = field(ATTEMPT),
            http.request.attempts = field(ATTEMPTS),
            http.response.code = field(RESPONSE_CODE),
            http.response.payload = field(RESPONSE_PAYLOAD),
            error = field(ERROR),
            "{}",
            $message
        )
    }};
}

impl Diagnostics for TracingDiagnostics {
    fn log(&self, level: Level, message: &str, fields: &Fields) {
        match level {
            Level::Info => emit!(tracing::Level::INFO, message, fields),
            Level::Warn => emit!(tracing::Level::WARN, message, fields),
            Level::Error => emit!(tracing::Level::ERROR, message, fields),
        }
    }
}
