//! The boundary between the harness and the workflow execution host.
//!
//! The harness treats the host as opaque: it starts it with a [`HostContext`],
//! sends one trigger request, and reads the outcome from the shared
//! [`RunMonitor`] the host reports into.

mod client;
mod definition;
mod local;

pub use client::{HyperOutbound, OutboundHttp, OutboundRequest, OutboundResponse};
pub use definition::{
    ActionDefinition, ActionType, BodySource, HttpAction, TransferMode, TriggerDefinition,
    WorkflowDefinition,
};
pub use local::LocalWorkflowHost;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use mockwork_core::error::Result;
use mockwork_core::monitor::{RunMonitor, TriggerResponse};
use mockwork_core::settings::Settings;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by host operations.
pub type HostFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Everything a host needs to run inside one test.
#[derive(Debug, Clone)]
pub struct HostContext {
    /// Resolved application settings.
    pub settings: Settings,
    /// Base URL of the runner's mock server.
    pub mock_base_url: String,
    /// Status table the host reports into.
    pub monitor: Arc<RunMonitor>,
}

/// The request that starts a run.
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    /// HTTP method.
    pub method: Method,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
}

impl TriggerRequest {
    /// Create a trigger request with no headers and no body.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and its content type.
    pub fn with_json(mut self, value: &serde_json::Value) -> Self {
        self.body = Bytes::from(value.to_string());
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self
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
            _ => tracing::warn!(header = name, "Skipping invalid trigger header"),
        }
        self
    }
}

/// A workflow execution host driven by the harness.
///
/// # Example
///
/// ```ignore
/// struct NoopHost;
///
/// impl WorkflowHost for NoopHost {
///     fn name(&self) -> &str { "noop" }
///     fn start<'a>(&'a mut self, _ctx: HostContext) -> HostFuture<'a, ()> {
///         Box::pin(async { Ok(()) })
///     }
///     fn trigger<'a>(&'a self, _req: TriggerRequest) -> HostFuture<'a, TriggerResponse> {
///         Box::pin(async { Ok(TriggerResponse::new(StatusCode::ACCEPTED, "")) })
///     }
///     fn shutdown(&mut self) {}
/// }
/// ```
pub trait WorkflowHost: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Prepare the host for a run.
    fn start<'a>(&'a mut self, ctx: HostContext) -> HostFuture<'a, ()>;

    /// Deliver the trigger request and return the synchronous response.
    ///
    /// A host that accepts the trigger must move the run out of
    /// `NotTriggered` before returning.
    fn trigger<'a>(&'a self, request: TriggerRequest) -> HostFuture<'a, TriggerResponse>;

    /// Release everything the host holds. Must be idempotent.
    fn shutdown(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_request_json_sets_content_type() {
        let request = TriggerRequest::new(Method::POST).with_json(&serde_json::json!({"a": 1}));
        assert_eq!(
            request.headers.get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(request.body, Bytes::from_static(br#"{"a":1}"#));
    }

    #[test]
    fn invalid_trigger_header_is_skipped() {
        let request = TriggerRequest::new(Method::GET).with_header("bad header", "x");
        assert!(request.headers.is_empty());
    }
}
