//! Request handling for the mock server.

use super::ServerState;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use mockwork_core::error::MockworkError;
use mockwork_core::http::{MockRequest, MockResponse};
use std::convert::Infallible;
use std::sync::Arc;

/// Dispatch one intercepted call.
pub async fn route(
    req: Request<Incoming>,
    state: Arc<ServerState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let target = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), |pq| pq.to_string());
    let absolute = format!("{}{}", state.base_url(), target);

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::warn!(uri = %absolute, error = %e, "Failed to read intercepted request body");
            return Ok(plain(StatusCode::BAD_REQUEST, "unreadable request body"));
        }
    };

    let mut request = match MockRequest::new(parts.method, &absolute) {
        Ok(request) => request.with_body(body),
        Err(e) => {
            tracing::warn!(uri = %absolute, error = %e, "Rejected intercepted request");
            return Ok(into_hyper(MockResponse::from_error(&e)));
        }
    };
    request.headers = parts.headers;

    tracing::debug!(method = %request.method, path = %request.path, "Intercepted call");

    // The registry guard must be released before any await point.
    let outcome = state.registry.read().dispatch(&request);
    let (response, unmatched) = match outcome {
        Ok(response) => (response, false),
        Err(e) => {
            let unmatched = matches!(e, MockworkError::UnmatchedRequest { .. });
            (MockResponse::from_error(&e), unmatched)
        }
    };

    state
        .log
        .record(request, response.status.as_u16(), unmatched);

    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }

    Ok(into_hyper(response))
}

fn into_hyper(response: MockResponse) -> Response<Full<Bytes>> {
    let mut out = Response::new(Full::new(response.body));
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;
    out
}

fn plain(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    let mut out = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *out.status_mut() = status;
    out
}
