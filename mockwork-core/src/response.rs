//! Deferred response synthesis.
//!
//! A [`ResponseBuilder`] describes a response; nothing is evaluated until
//! [`ResponseBuilder::synthesize`] runs at dispatch time. Body producers and
//! computed headers therefore observe live state (counters, upload sessions).

use crate::error::{MockworkError, Result};
use crate::http::{MockContent, MockRequest, MockResponse};
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type BodyProducer = Arc<dyn Fn() -> MockContent + Send + Sync>;
type HeaderProducer = Arc<dyn Fn(&MockRequest) -> String + Send + Sync>;

/// Where a response body comes from.
#[derive(Clone, Default)]
pub enum BodySource {
    /// No body.
    #[default]
    Empty,
    /// Fixed content.
    Static(MockContent),
    /// Produced anew for every dispatch.
    Producer(BodyProducer),
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Static(content) => f
                .debug_struct("Static")
                .field("len", &content.bytes.len())
                .field("content_type", &content.content_type)
                .finish(),
            Self::Producer(_) => f.write_str("Producer"),
        }
    }
}

/// A header value, fixed or computed from the request.
#[derive(Clone)]
pub enum HeaderSource {
    /// Fixed value.
    Static(String),
    /// Evaluated against the dispatched request.
    Computed(HeaderProducer),
}

impl fmt::Debug for HeaderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed"),
        }
    }
}

/// Fluent description of a mock response.
///
/// # Example
///
/// ```
/// use mockwork_core::response::ResponseBuilder;
/// use serde_json::json;
///
/// let response = ResponseBuilder::create()
///     .with_success()
///     .with_content_as_json(json!({"id": 54624}));
/// ```
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Vec<(String, HeaderSource)>,
    body: BodySource,
    delay: Option<Duration>,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: BodySource::Empty,
            delay: None,
        }
    }
}

impl ResponseBuilder {
    /// Start a response: 200, no headers, empty body.
    pub fn create() -> Self {
        Self::default()
    }

    /// Set the status code.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// 200 OK.
    pub fn with_success(self) -> Self {
        self.with_status(StatusCode::OK)
    }

    /// 202 Accepted.
    pub fn with_accepted(self) -> Self {
        self.with_status(StatusCode::ACCEPTED)
    }

    /// 204 No Content.
    pub fn with_no_content(self) -> Self {
        self.with_status(StatusCode::NO_CONTENT)
    }

    /// 401 Unauthorized.
    pub fn with_unauthorized(self) -> Self {
        self.with_status(StatusCode::UNAUTHORIZED)
    }

    /// 404 Not Found.
    pub fn with_not_found(self) -> Self {
        self.with_status(StatusCode::NOT_FOUND)
    }

    /// 500 Internal Server Error.
    pub fn with_internal_server_error(self) -> Self {
        self.with_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Add a fixed header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .push((name.into(), HeaderSource::Static(value.into())));
        self
    }

    /// Add a header computed from the request at dispatch time.
    pub fn with_header_fn<F>(mut self, name: impl Into<String>, producer: F) -> Self
    where
        F: Fn(&MockRequest) -> String + Send + Sync + 'static,
    {
        self.headers
            .push((name.into(), HeaderSource::Computed(Arc::new(producer))));
        self
    }

    /// Use fixed content.
    pub fn with_static_content(mut self, content: MockContent) -> Self {
        self.body = BodySource::Static(content);
        self
    }

    /// Produce the content lazily on each dispatch.
    pub fn with_content<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> MockContent + Send + Sync + 'static,
    {
        self.body = BodySource::Producer(Arc::new(producer));
        self
    }

    /// Fixed JSON content.
    pub fn with_content_as_json(self, value: serde_json::Value) -> Self {
        self.with_static_content(MockContent::json(&value))
    }

    /// Fixed plain text content.
    pub fn with_content_as_plain_text(self, text: impl Into<String>) -> Self {
        self.with_static_content(MockContent::plain_text(text))
    }

    /// Delay delivery of the response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Status this builder responds with.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Body source.
    pub fn body(&self) -> &BodySource {
        &self.body
    }

    /// Check every header name, and every fixed header value.
    ///
    /// Computed values are only known at dispatch time.
    pub fn validate(&self) -> Result<()> {
        for (name, source) in &self.headers {
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| MockworkError::ConfigValue {
                key: name.clone(),
                cause: format!("invalid response header name: {}", e),
            })?;
            if let HeaderSource::Static(value) = source {
                HeaderValue::from_str(value).map_err(|e| MockworkError::ConfigValue {
                    key: name.clone(),
                    cause: format!("invalid response header value: {}", e),
                })?;
            }
        }
        Ok(())
    }

    /// Build the concrete response for one dispatched request.
    pub fn synthesize(&self, request: &MockRequest) -> MockResponse {
        let mut response = match &self.body {
            BodySource::Empty => MockResponse::empty(self.status),
            BodySource::Static(content) => MockResponse::with_content(self.status, content.clone()),
            BodySource::Producer(produce) => MockResponse::with_content(self.status, produce()),
        };

        for (name, source) in &self.headers {
            let value = match source {
                HeaderSource::Static(value) => value.clone(),
                HeaderSource::Computed(compute) => compute(request),
            };
            response = response.with_header(name, &value);
        }

        response.delay = self.delay;
        response
    }
}
