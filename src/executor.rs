use std::{fmt, sync::Arc, time::Duration};

use reqwest::{header::HeaderMap, Url};

use crate::{
    diagnostics::{
        Diagnostics, Fields, Level, TracingDiagnostics, ATTEMPT, ATTEMPTS, HEADERS, METHOD,
        PAYLOAD, RESPONSE_CODE, RESPONSE_PAYLOAD, URI,
    },
    Method, ReplayableBody, RequestError, RequestSpec, Response, Result,
};

/// Sends a [`RequestSpec`] with bounded, strictly sequential retries.
///
/// Every attempt is bounded by the request's timeout and by its cancellation
/// token. A received response of any status ends the loop; timeouts and
/// transport errors are retried until the attempt budget is spent. No delay
/// is inserted between attempts.
#[derive(Clone)]
pub struct RequestExecutor {
    http: reqwest::Client,
    diagnostics: Arc<dyn Diagnostics>,
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("http", &self.http)
            .field("diagnostics", &"<dyn Diagnostics>")
            .finish()
    }
}

impl Default for RequestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// What a single attempt resolved to.
enum AttemptResult {
    Timeout,
    Failed(reqwest::Error),
    /// Headers arrived but reading the body failed.
    BodyFailed(reqwest::Error),
    Response(Response),
}

impl RequestExecutor {
    /// Creates an executor that reports through [`TracingDiagnostics`].
    pub fn new() -> Self {
        Self::with_diagnostics(Arc::new(TracingDiagnostics))
    }

    pub fn with_diagnostics(diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            http: reqwest::Client::new(),
            diagnostics,
        }
    }

    /// Replaces the underlying `reqwest` client.
    pub fn with_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Runs `spec` to completion.
    ///
    /// A streamed payload is read into memory before the first attempt,
    /// raced against the cancellation token; a failure there is returned as
    /// [`RequestError::ReadBody`] without touching the network. A response
    /// whose body cannot be read ends execution with
    /// [`RequestError::ResponseBody`] and is not retried.
    pub async fn execute(&self, mut spec: RequestSpec) -> Result<Response> {
        let Some(url) = spec.uri.clone() else {
            let err = RequestError::MissingUri;
            self.diagnostics.log(
                Level::Error,
                "API call rejected",
                &request_fields(&spec, None).error(&err),
            );
            return Err(err);
        };

        if spec.cancel.is_cancelled() {
            return Err(self.cancelled(0, &request_fields(&spec, None)));
        }

        let materialized = tokio::select! {
            biased;
            _ = spec.cancel.cancelled() => None,
            body = spec.payload.materialize() => Some(body.map(|body| body.cloned())),
        };
        let body = match materialized {
            None => return Err(self.cancelled(0, &request_fields(&spec, None))),
            Some(Ok(body)) => body,
            Some(Err(err)) => {
                self.diagnostics.log(
                    Level::Error,
                    "failed to read request body",
                    &request_fields(&spec, None).error(&err),
                );
                return Err(err);
            }
        };

        let base = request_fields(&spec, body.as_ref());
        let budget = spec.attempt_budget.max(1);
        let mut attempt = 0u32;

        loop {
            if spec.cancel.is_cancelled() {
                return Err(self.cancelled(attempt, &base));
            }

            let send = self.send_once(
                &spec.headers,
                spec.method,
                &url,
                body.as_ref(),
                spec.timeout,
            );
            let result = tokio::select! {
                biased;
                _ = spec.cancel.cancelled() => None,
                result = send => Some(result),
            };

            let failure = match result {
                None => return Err(self.cancelled(attempt + 1, &base)),
                Some(AttemptResult::Response(mut response)) => {
                    response.attempts = attempt + 1;
                    let fields = base
                        .clone()
                        .with(ATTEMPT, i64::from(attempt))
                        .with(RESPONSE_CODE, i64::from(response.status.as_u16()))
                        .with(RESPONSE_PAYLOAD, response.text().into_owned());
                    self.diagnostics
                        .log(Level::Info, "API call successful", &fields);
                    return Ok(response);
                }
                Some(AttemptResult::BodyFailed(source)) => {
                    let err = RequestError::ResponseBody { attempt, source };
                    self.diagnostics.log(
                        Level::Error,
                        "failed to read response body",
                        &base.clone().with(ATTEMPT, i64::from(attempt)).error(&err),
                    );
                    return Err(err);
                }
                Some(AttemptResult::Timeout) => {
                    let err = RequestError::NetworkTimeout { attempt };
                    self.diagnostics.log(
                        Level::Warn,
                        "request timed out",
                        &base.clone().with(ATTEMPT, i64::from(attempt)).error(&err),
                    );
                    err
                }
                Some(AttemptResult::Failed(source)) => {
                    let err = RequestError::Network { attempt, source };
                    self.diagnostics.log(
                        Level::Error,
                        "API call failed",
                        &base.clone().with(ATTEMPT, i64::from(attempt)).error(&err),
                    );
                    err
                }
            };

            attempt += 1;
            if attempt >= budget {
                let err = RequestError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(failure),
                };
                self.diagnostics.log(
                    Level::Error,
                    "API call failed",
                    &base
                        .clone()
                        .with(ATTEMPTS, i64::from(attempt))
                        .error(&err),
                );
                return Err(err);
            }
        }
    }

    async fn send_once(
        &self,
        headers: &HeaderMap,
        method: Method,
        url: &Url,
        body: Option<&ReplayableBody>,
        timeout: Duration,
    ) -> AttemptResult {
        let mut request = self
            .http
            .request(method.into(), url.clone())
            .headers(headers.clone())
            .timeout(timeout);
        if let Some(body) = body {
            request = request.body(body.view());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return classify(err),
        };

        let status = response.status();
        let headers = response.headers().clone();
        match response.bytes().await {
            Ok(body) => AttemptResult::Response(Response {
                status,
                headers,
                body,
                attempts: 0,
            }),
            Err(err) => AttemptResult::BodyFailed(err),
        }
    }

    fn cancelled(&self, attempts: u32, base: &Fields) -> RequestError {
        let err = RequestError::Cancelled { attempts };
        let fields = base
            .clone()
            .with(ATTEMPTS, i64::from(attempts))
            .error(&err);
        self.diagnostics
            .log(Level::Warn, "API call cancelled", &fields);
        err
    }

    /// Reports a builder that recorded a validation error, with whatever
    /// configuration was applied before it.
    pub(crate) fn report_rejected(&self, spec: &RequestSpec, err: &RequestError) {
        let fields = request_fields(spec, spec.payload.buffered()).error(err);
        self.diagnostics
            .log(Level::Error, "API call rejected", &fields);
    }
}

fn classify(err: reqwest::Error) -> AttemptResult {
    if err.is_timeout() {
        AttemptResult::Timeout
    } else {
        AttemptResult::Failed(err)
    }
}

/// Request-side fields shared by every record of one execution.
fn request_fields(spec: &RequestSpec, body: Option<&ReplayableBody>) -> Fields {
    let mut fields = Fields::new()
        .with(METHOD, spec.method.as_str())
        .with(HEADERS, spec.header_map());
    let uri = spec.request_uri();
    if !uri.is_empty() {
        fields.insert(URI, uri);
    }
    if let Some(body) = body.filter(|body| !body.is_empty()) {
        fields.insert(PAYLOAD, body.as_text().into_owned());
    }
    fields
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use tokio_util::sync::CancellationToken;

    use super::{request_fields, RequestExecutor};
    use crate::{
        diagnostics::{
            Diagnostics, FieldValue, Fields, Level, ATTEMPT, ATTEMPTS, ERROR, METHOD, PAYLOAD, URI,
        },
        RequestBuilder, RequestError,
    };

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(Level, String, Fields)>>);

    impl Diagnostics for Recorder {
        fn log(&self, level: Level, message: &str, fields: &Fields) {
            self.0
                .lock()
                .expect("recorder mutex must not be poisoned")
                .push((level, message.to_owned(), fields.clone()));
        }
    }

    #[test]
    fn request_fields_skip_empty_payload_and_uri() {
        let spec = RequestBuilder::new().build().expect("empty builder builds");
        let fields = request_fields(&spec, None);
        assert!(!fields.contains_key(URI));
        assert!(!fields.contains_key(PAYLOAD));
        assert_eq!(
            fields.get("http.request.method"),
            Some(&FieldValue::Str("GET".to_owned()))
        );
    }

    #[tokio::test]
    async fn missing_uri_fails_without_attempt_records() {
        let recorder = Arc::new(Recorder::default());
        let executor = RequestExecutor::with_diagnostics(recorder.clone());
        let spec = RequestBuilder::new()
            .method("POST")
            .payload("data")
            .build()
            .expect("builder without uri builds");

        let err = executor
            .execute(spec)
            .await
            .expect_err("missing uri must fail");

        assert!(matches!(err, RequestError::MissingUri));
        let records = recorder.0.lock().expect("recorder mutex");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, Level::Error);
        assert!(!records[0].2.contains_key(ATTEMPT));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_attempt() {
        let recorder = Arc::new(Recorder::default());
        let executor = RequestExecutor::with_diagnostics(recorder.clone());
        let token = CancellationToken::new();
        token.cancel();

        let err = RequestBuilder::get("http://127.0.0.1:9/never")
            .context(token)
            .execute(&executor)
            .await
            .expect_err("cancelled request must fail");

        assert!(matches!(err, RequestError::Cancelled { attempts: 0 }));
        let records = recorder.0.lock().expect("recorder mutex");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1, "API call cancelled");
    }

    #[tokio::test]
    async fn rejected_builder_is_reported_with_applied_configuration() {
        let recorder = Arc::new(Recorder::default());
        let executor = RequestExecutor::with_diagnostics(recorder.clone());

        let err = RequestBuilder::new()
            .uri("http://svc/resource?id=3")
            .method("PATCH")
            .execute(&executor)
            .await
            .expect_err("PATCH must be rejected");

        assert!(matches!(err, RequestError::Configuration { .. }));
        let records = recorder.0.lock().expect("recorder mutex");
        assert_eq!(records.len(), 1);
        let (level, message, fields) = &records[0];
        assert_eq!(*level, Level::Error);
        assert_eq!(message, "API call rejected");
        assert_eq!(
            fields.get(URI),
            Some(&FieldValue::Str("/resource?id=3".to_owned()))
        );
        assert_eq!(fields.get(METHOD), Some(&FieldValue::Str("GET".to_owned())));
        assert!(fields.contains_key(ERROR));
    }

    #[tokio::test]
    async fn cancelled_token_skips_reading_unread_stream() {
        let recorder = Arc::new(Recorder::default());
        let executor = RequestExecutor::with_diagnostics(recorder.clone());
        let token = CancellationToken::new();
        token.cancel();
        // writer half stays open, so reading the body would never finish
        let (reader, _writer) = tokio::io::duplex(64);

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            RequestBuilder::post("http://127.0.0.1:9/never")
                .payload_from_reader(reader)
                .context(token)
                .execute(&executor),
        )
        .await
        .expect("cancelled request must not block on the body");

        let err = result.expect_err("cancelled request must fail");
        assert!(matches!(err, RequestError::Cancelled { attempts: 0 }));
        let records = recorder.0.lock().expect("recorder mutex");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1, "API call cancelled");
        assert_eq!(records[0].2.get(ATTEMPTS), Some(&FieldValue::Number(0)));
    }

    #[tokio::test]
    async fn cancelling_while_stream_is_read_aborts_execution() {
        let executor = RequestExecutor::with_diagnostics(Arc::new(Recorder::default()));
        let token = CancellationToken::new();
        let canceller = token.clone();
        let (reader, _writer) = tokio::io::duplex(64);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            RequestBuilder::put("http://127.0.0.1:9/never")
                .payload_from_reader(reader)
                .context(token)
                .execute(&executor),
        )
        .await
        .expect("cancellation must interrupt the body read");

        assert!(matches!(
            result,
            Err(RequestError::Cancelled { attempts: 0 })
        ));
    }
}
