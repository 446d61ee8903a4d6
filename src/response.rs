use std::borrow::Cow;

use bytes::Bytes;
use reqwest::{header::HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

/// Fully buffered HTTP response of a successful execution.
///
/// Any status code counts as success at this layer; interpreting 4xx/5xx is
/// left to the caller.
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) attempts: u32,
}

impl Response {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Attempts made, including the one that produced this response.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use reqwest::{header::HeaderMap, StatusCode};
    use serde::Deserialize;

    use super::Response;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    fn response(body: &'static str) -> Response {
        Response {
            status: StatusCode::NOT_FOUND,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
            attempts: 2,
        }
    }

    #[test]
    fn readers_expose_buffered_body() {
        let resp = response(r#"{"id": 7}"#);
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.attempts(), 2);
        assert_eq!(resp.json::<Item>().expect("json body"), Item { id: 7 });
        assert_eq!(resp.text(), r#"{"id": 7}"#);
    }

    #[test]
    fn json_reports_decode_errors() {
        assert!(response("not json").json::<Item>().is_err());
    }
}
