use std::time::Duration;

use bytes::Bytes;
use reqwest::{
    header::{self, HeaderName, HeaderValue},
    Url,
};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::{
    Method, Payload, RequestError, RequestExecutor, RequestOptions, RequestSpec, Response, Result,
};

/// Fluent, validating construction of a [`RequestSpec`].
///
/// The first invalid input (method, URI or header) is recorded and every
/// later setter becomes a no-op, so the builder stays invalid and the error
/// surfaces from [`build`](RequestBuilder::build) or
/// [`execute`](RequestBuilder::execute) instead of a half-configured request.
///
/// # Example
///
/// ```no_run
/// use resilient_request::{RequestBuilder, RequestExecutor};
///
/// # async fn run() -> resilient_request::Result<()> {
/// let executor = RequestExecutor::new();
/// let response = RequestBuilder::post("http://svc/resource")
///     .header("content-type", "application/json")
///     .payload(r#"{"name":"kit"}"#)
///     .retries(2)
///     .execute(&executor)
///     .await?;
/// println!("{} {}", response.status(), response.text());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
#[must_use = "RequestBuilder does nothing until .build() or .execute() is called"]
pub struct RequestBuilder {
    spec: RequestSpec,
    error: Option<RequestError>,
}

impl RequestBuilder {
    /// Starts a `GET` request with no target, default timeout and retries.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(uri: &str) -> Self {
        Self::with_method(Method::Get).uri(uri)
    }

    pub fn post(uri: &str) -> Self {
        Self::with_method(Method::Post).uri(uri)
    }

    pub fn put(uri: &str) -> Self {
        Self::with_method(Method::Put).uri(uri)
    }

    pub fn delete(uri: &str) -> Self {
        Self::with_method(Method::Delete).uri(uri)
    }

    fn with_method(method: Method) -> Self {
        let mut builder = Self::new();
        builder.spec.method = method;
        builder
    }

    /// Sets the method; only `GET`, `POST`, `PUT` and `DELETE` are accepted.
    pub fn method(mut self, method: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match method.parse::<Method>() {
            Ok(method) => self.spec.method = method,
            Err(err) => self.error = Some(err),
        }
        self
    }

    pub fn uri(mut self, uri: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match Url::parse(uri) {
            Ok(url) => self.spec.uri = Some(url),
            Err(err) => {
                self.error = Some(RequestError::configuration(format!(
                    "invalid URL '{uri}': {err}"
                )))
            }
        }
        self
    }

    /// Sets a header, replacing any earlier value for the same name.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.spec.headers.insert(name, value);
            }
            (Err(err), _) => {
                self.error = Some(RequestError::configuration(format!(
                    "invalid header name '{name}': {err}"
                )))
            }
            (_, Err(err)) => {
                self.error = Some(RequestError::configuration(format!(
                    "invalid value for header '{name}': {err}"
                )))
            }
        }
        self
    }

    /// Sets the request cookie and mirrors it into the `Cookie` header.
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        let cookie = format!("{name}={value}");
        match HeaderValue::from_str(&cookie) {
            Ok(header_value) => {
                self.spec.headers.insert(header::COOKIE, header_value);
                self.spec.cookie = Some(cookie);
            }
            Err(err) => {
                self.error = Some(RequestError::configuration(format!(
                    "invalid cookie '{name}': {err}"
                )))
            }
        }
        self
    }

    /// Uses `bytes` as the body for every attempt.
    pub fn payload(mut self, bytes: impl Into<Bytes>) -> Self {
        if self.error.is_none() {
            self.spec.payload = Payload::from_bytes(bytes);
        }
        self
    }

    /// Uses a stream as the body; it is read once, right before the first send.
    pub fn payload_from_reader<R>(mut self, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        if self.error.is_none() {
            self.spec.payload = Payload::from_reader(reader);
        }
        self
    }

    /// Wall-clock bound for each attempt, not for the whole execution.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        if self.error.is_none() {
            self.spec.timeout = timeout;
        }
        self
    }

    /// Retries after the first attempt; `0` means exactly one attempt.
    pub fn retries(mut self, retries: u32) -> Self {
        if self.error.is_none() {
            self.spec.attempt_budget = retries.saturating_add(1);
        }
        self
    }

    /// Applies timeout and retry budget from loaded options.
    pub fn with_options(self, options: &RequestOptions) -> Self {
        self.timeout(options.timeout()).retries(options.retries)
    }

    /// Cancellation token shared by all attempts.
    pub fn context(mut self, token: CancellationToken) -> Self {
        if self.error.is_none() {
            self.spec.cancel = token;
        }
        self
    }

    /// Returns the configured request, or the first recorded validation error.
    pub fn build(self) -> Result<RequestSpec> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.spec),
        }
    }

    /// Builds the request and runs it on `executor`.
    pub async fn execute(self, executor: &RequestExecutor) -> Result<Response> {
        match self.error {
            None => executor.execute(self.spec).await,
            Some(err) => {
                executor.report_rejected(&self.spec, &err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::header;
    use tokio_util::sync::CancellationToken;

    use super::RequestBuilder;
    use crate::{Method, RequestError, RequestOptions};

    #[test]
    fn collects_configuration() {
        let token = CancellationToken::new();
        let spec = RequestBuilder::new()
            .method("put")
            .uri("http://svc/resource")
            .header("X-Trace", "a")
            .header("x-trace", "b")
            .timeout(Duration::from_millis(500))
            .retries(0)
            .context(token.clone())
            .build()
            .expect("valid builder must build");

        assert_eq!(spec.method(), Method::Put);
        assert_eq!(spec.uri().map(|u| u.as_str()), Some("http://svc/resource"));
        assert_eq!(spec.headers().len(), 1);
        assert_eq!(spec.headers()["x-trace"], "b");
        assert_eq!(spec.timeout(), Duration::from_millis(500));
        assert_eq!(spec.attempt_budget(), 1);
        token.cancel();
        assert!(spec.cancellation_token().is_cancelled());
    }

    #[test]
    fn unsupported_method_poisons_builder() {
        let err = RequestBuilder::new()
            .method("PATCH")
            .uri("http://svc/resource")
            .method("GET")
            .build()
            .expect_err("PATCH must be rejected");

        match err {
            RequestError::Configuration { reason } => assert!(reason.contains("PATCH")),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_uri_is_rejected() {
        let err = RequestBuilder::new()
            .uri("http://[::1")
            .build()
            .expect_err("malformed uri must fail");
        assert!(matches!(err, RequestError::Configuration { .. }));
    }

    #[test]
    fn invalid_header_is_rejected() {
        let err = RequestBuilder::get("http://svc/")
            .header("bad header", "v")
            .build()
            .expect_err("header name with space must fail");
        assert!(matches!(err, RequestError::Configuration { .. }));
    }

    #[test]
    fn cookie_is_mirrored_into_headers_last_write_wins() {
        let spec = RequestBuilder::get("http://svc/")
            .cookie("session", "one")
            .cookie("session", "two")
            .build()
            .expect("cookie must be accepted");

        assert_eq!(spec.cookie(), Some("session=two"));
        assert_eq!(spec.headers()[header::COOKIE], "session=two");
    }

    #[test]
    fn missing_uri_still_builds() {
        let spec = RequestBuilder::new().build().expect("empty builder builds");
        assert!(spec.uri().is_none());
    }

    #[test]
    fn options_set_timeout_and_budget() {
        let spec = RequestBuilder::get("http://svc/")
            .with_options(&RequestOptions {
                timeout_ms: 1_500,
                retries: 5,
            })
            .build()
            .expect("options must apply");
        assert_eq!(spec.timeout(), Duration::from_millis(1_500));
        assert_eq!(spec.attempt_budget(), 6);
    }

    #[test]
    fn buffered_payload_is_kept() {
        let spec = RequestBuilder::post("http://svc/")
            .payload("data")
            .build()
            .expect("payload must be accepted");
        let body = spec.payload().buffered().expect("payload is buffered");
        assert_eq!(body.as_text(), "data");
    }
}
