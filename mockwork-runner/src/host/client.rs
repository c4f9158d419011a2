//! Outbound HTTP used by the reference host.

use super::HostFuture;
use bytes::Bytes;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use mockwork_core::error::MockworkError;
use std::time::Duration;

/// A request leaving the host.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
}

impl OutboundRequest {
    /// Create a request with no headers and no body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// The response to an [`OutboundRequest`].
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl OutboundResponse {
    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Transport for outbound calls.
pub trait OutboundHttp: Send + Sync {
    /// Send one request.
    fn send<'a>(&'a self, request: OutboundRequest) -> HostFuture<'a, OutboundResponse>;
}

/// [`OutboundHttp`] over the hyper-util connection-pooling client.
#[derive(Clone)]
pub struct HyperOutbound {
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl HyperOutbound {
    /// Create a client with a 30 second per-request timeout.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create with a custom per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            timeout,
        }
    }

    /// Get the configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HyperOutbound {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundHttp for HyperOutbound {
    fn send<'a>(&'a self, request: OutboundRequest) -> HostFuture<'a, OutboundResponse> {
        Box::pin(async move {
            let uri = request
                .url
                .parse::<hyper::Uri>()
                .map_err(|e| MockworkError::Network {
                    cause: format!("invalid URL '{}': {}", request.url, e),
                })?;

            let mut builder = Request::builder().method(request.method.clone()).uri(uri);
            if let Some(headers) = builder.headers_mut() {
                headers.extend(request.headers);
            }
            let outgoing = builder
                .body(Full::new(request.body))
                .map_err(|e| MockworkError::Network {
                    cause: format!("failed to build request: {}", e),
                })?;

            let response = tokio::time::timeout(self.timeout, self.client.request(outgoing))
                .await
                .map_err(|_| MockworkError::Network {
                    cause: format!(
                        "{} {} timed out after {}ms",
                        request.method,
                        request.url,
                        self.timeout.as_millis()
                    ),
                })?
                .map_err(|e| MockworkError::Network {
                    cause: format!("{} {}: {}", request.method, request.url, e),
                })?;

            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| MockworkError::Network {
                    cause: format!("failed to read response body: {}", e),
                })?
                .to_bytes();

            Ok(OutboundResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sends_method_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/upload"))
            .and(header("x-trace", "abc"))
            .and(body_string("payload"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("location", "/items/1")
                    .set_body_string("created"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut request =
            OutboundRequest::new(Method::POST, format!("{}/api/v1/upload", server.uri()));
        request.headers.insert("x-trace", "abc".parse().unwrap());
        request.body = Bytes::from_static(b"payload");

        let response = HyperOutbound::new().send(request).await.unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.header("location"), Some("/items/1"));
        assert_eq!(response.body, Bytes::from_static(b"created"));
    }

    #[tokio::test]
    async fn server_errors_are_responses_not_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let response = HyperOutbound::new()
            .send(OutboundRequest::new(Method::GET, server.uri()))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let err = HyperOutbound::with_timeout(Duration::from_millis(50))
            .send(OutboundRequest::new(Method::GET, server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E502");
    }

    #[tokio::test]
    async fn invalid_url_is_network_error() {
        let err = HyperOutbound::new()
            .send(OutboundRequest::new(Method::GET, "not a url"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E502");
    }
}
