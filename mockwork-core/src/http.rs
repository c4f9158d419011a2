//! Request and response values exchanged with a workflow host.

use crate::error::{MockworkError, Result};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode, Uri};
use std::time::Duration;

/// An outbound call issued by the workflow host.
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URI.
    pub uri: String,
    /// Path component of the URI.
    pub path: String,
    /// Raw query string, if any.
    pub query: Option<String>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
}

impl MockRequest {
    /// Create a request with no headers and an empty body.
    pub fn new(method: Method, uri: &str) -> Result<Self> {
        let parsed: Uri = uri.parse().map_err(|e: http::uri::InvalidUri| {
            MockworkError::ConfigValue {
                key: "uri".to_string(),
                cause: format!("'{}': {}", uri, e),
            }
        })?;
        Ok(Self {
            method,
            uri: uri.to_string(),
            path: parsed.path().to_string(),
            query: parsed.query().map(str::to_string),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        })
    }

    /// Add a header. Names or values that are not valid HTTP are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!(header = name, "Skipping invalid request header"),
        }
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Get a header value as a string. Header names are case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get the first value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then_some(value)
        })
    }

    /// Get the body as a string.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Get the body as JSON.
    pub fn body_json(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// A body together with its content type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockContent {
    /// Body bytes.
    pub bytes: Bytes,
    /// Content type tag, if any.
    pub content_type: Option<String>,
}

impl MockContent {
    /// JSON content (`application/json`).
    pub fn json(value: &serde_json::Value) -> Self {
        Self {
            bytes: Bytes::from(value.to_string()),
            content_type: Some("application/json".to_string()),
        }
    }

    /// JSON content serialized from any serializable value.
    pub fn try_json<T: serde::Serialize>(value: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(value).map_err(|e| MockworkError::ConfigValue {
            key: "content".to_string(),
            cause: format!("JSON serialization failed: {}", e),
        })?;
        Ok(Self {
            bytes: Bytes::from(bytes),
            content_type: Some("application/json".to_string()),
        })
    }

    /// Plain text content (`text/plain`).
    pub fn plain_text(text: impl Into<String>) -> Self {
        Self {
            bytes: Bytes::from(text.into()),
            content_type: Some("text/plain".to_string()),
        }
    }

    /// Raw bytes with an explicit content type.
    pub fn raw(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: Some(content_type.into()),
        }
    }
}

/// A synthesized response handed back to the workflow host.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
    /// Artificial delay before the response is delivered.
    pub delay: Option<Duration>,
}

impl MockResponse {
    /// Create a response with the given status and body.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            delay: None,
        }
    }

    /// Create a response with an empty body.
    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, Bytes::new())
    }

    /// Create a response carrying `content`, tagging its content type.
    pub fn with_content(status: StatusCode, content: MockContent) -> Self {
        let mut response = Self::new(status, content.bytes);
        if let Some(value) = content
            .content_type
            .and_then(|ct| HeaderValue::from_str(&ct).ok())
        {
            response.headers.insert(CONTENT_TYPE, value);
        }
        response
    }

    /// Create the JSON error body a failing dependency answers with.
    pub fn from_error(err: &MockworkError) -> Self {
        let status = err.http_status();
        let body = serde_json::json!({
            "error": {
                "code": err.code(),
                "message": err.to_string(),
                "status": status.as_u16()
            }
        });
        Self::with_content(status, MockContent::json(&body))
    }

    /// Add a header. Invalid names or values are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::warn!(header = name, "Skipping invalid response header"),
        }
        self
    }

    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get the body as a string.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Get the body as JSON.
    pub fn body_json(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_splits_uri() {
        let req = MockRequest::new(
            Method::GET,
            "http://127.0.0.1:8080/api/v1/data?page=2&size=10",
        )
        .unwrap();
        assert_eq!(req.path, "/api/v1/data");
        assert_eq!(req.query_param("page"), Some("2"));
        assert_eq!(req.query_param("size"), Some("10"));
        assert_eq!(req.query_param("missing"), None);
    }

    #[test]
    fn request_headers_are_case_insensitive() {
        let req = MockRequest::new(Method::POST, "http://localhost/upload")
            .unwrap()
            .with_header("Transfer-Mode", "chunked");
        assert_eq!(req.header("transfer-mode"), Some("chunked"));
    }

    #[test]
    fn invalid_uri_is_rejected() {
        assert!(MockRequest::new(Method::GET, "http://exa mple.com/").is_err());
    }

    #[test]
    fn error_response_has_code_and_status() {
        let err = MockworkError::UnknownSession {
            endpoint: "abc".to_string(),
        };
        let response = MockResponse::from_error(&err);
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.header("content-type"), Some("application/json"));
        let body = response.body_json().unwrap();
        assert_eq!(body["error"]["code"], "E206");
        assert_eq!(body["error"]["status"], 404);
    }

    #[test]
    fn content_helpers_tag_content_type() {
        let text = MockResponse::with_content(StatusCode::OK, MockContent::plain_text("success"));
        assert_eq!(text.header("content-type"), Some("text/plain"));
        assert_eq!(text.body_string(), "success");
    }
}
