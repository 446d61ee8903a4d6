use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

use reqwest::{header::HeaderMap, Url};
use tokio_util::sync::CancellationToken;

use crate::{Payload, RequestError, RequestOptions};

/// HTTP methods accepted by [`RequestBuilder`](crate::RequestBuilder).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = RequestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            _ => Err(RequestError::configuration(format!(
                "invalid or unsupported http method: {value}"
            ))),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Fully configured description of one outbound call.
///
/// Produced by [`RequestBuilder::build`](crate::RequestBuilder::build) and
/// consumed by [`RequestExecutor::execute`](crate::RequestExecutor::execute).
pub struct RequestSpec {
    pub(crate) method: Method,
    pub(crate) uri: Option<Url>,
    pub(crate) headers: HeaderMap,
    pub(crate) cookie: Option<String>,
    pub(crate) payload: Payload,
    pub(crate) timeout: Duration,
    pub(crate) attempt_budget: u32,
    pub(crate) cancel: CancellationToken,
}

impl Default for RequestSpec {
    fn default() -> Self {
        let options = RequestOptions::default();
        Self {
            method: Method::default(),
            uri: None,
            headers: HeaderMap::new(),
            cookie: None,
            payload: Payload::Empty,
            timeout: options.timeout(),
            attempt_budget: options.attempt_budget(),
            cancel: CancellationToken::new(),
        }
    }
}

impl fmt::Debug for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSpec")
            .field("method", &self.method)
            .field("uri", &self.uri.as_ref().map(Url::as_str))
            .field("headers", &self.header_map())
            .field("payload", &self.payload)
            .field("timeout", &self.timeout)
            .field("attempt_budget", &self.attempt_budget)
            .finish()
    }
}

impl RequestSpec {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn uri(&self) -> Option<&Url> {
        self.uri.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Total attempts allowed, configured retries plus one.
    pub fn attempt_budget(&self) -> u32 {
        self.attempt_budget
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Path and query of the target, as logged in diagnostics.
    pub(crate) fn request_uri(&self) -> String {
        match &self.uri {
            Some(url) => match url.query() {
                Some(query) => format!("{}?{query}", url.path()),
                None => url.path().to_owned(),
            },
            None => String::new(),
        }
    }

    /// Headers as a plain string mapping for diagnostics.
    pub(crate) fn header_map(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }
}
