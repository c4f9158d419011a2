//! Interception log: append-only record of outbound calls.
//!
//! Every call the workflow host makes is recorded together with the status it
//! was answered with, whether or not a mock matched it. Sequence numbers are
//! assigned under the same lock that appends, so they strictly increase in
//! log order and are never reused.

use crate::http::MockRequest;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, Method};
use parking_lot::Mutex;

/// Immutable snapshot of one outbound call.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    /// Arrival sequence number, starting at 1.
    pub sequence: u64,
    /// HTTP method.
    pub method: Method,
    /// Absolute URI.
    pub uri: String,
    /// Path component.
    pub path: String,
    /// Raw query string.
    pub query: Option<String>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
    /// Status the call was answered with.
    pub response_status: u16,
    /// Whether no mock resolved the call.
    pub unmatched: bool,
    /// When the call was recorded.
    pub received_at: DateTime<Utc>,
}

impl InterceptedRequest {
    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get the body as a string.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Get the body as JSON.
    pub fn body_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[derive(Debug, Default)]
struct LogInner {
    entries: Vec<InterceptedRequest>,
    next_sequence: u64,
}

/// Thread-safe, append-only interception log.
#[derive(Debug, Default)]
pub struct InterceptionLog {
    inner: Mutex<LogInner>,
}

impl InterceptionLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a call and the status it was answered with.
    ///
    /// Returns the call's sequence number.
    pub fn record(&self, request: MockRequest, response_status: u16, unmatched: bool) -> u64 {
        let mut inner = self.inner.lock();
        inner.next_sequence += 1;
        let sequence = inner.next_sequence;
        inner.entries.push(InterceptedRequest {
            sequence,
            method: request.method,
            uri: request.uri,
            path: request.path,
            query: request.query,
            headers: request.headers,
            body: request.body,
            response_status,
            unmatched,
            received_at: Utc::now(),
        });
        sequence
    }

    /// Snapshot of all calls in arrival order.
    pub fn requests(&self) -> Vec<InterceptedRequest> {
        self.inner.lock().entries.clone()
    }

    /// Calls satisfying `predicate`, in arrival order.
    pub fn filter<P>(&self, predicate: P) -> Vec<InterceptedRequest>
    where
        P: Fn(&InterceptedRequest) -> bool,
    {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    /// First call satisfying `predicate`.
    pub fn find<P>(&self, predicate: P) -> Option<InterceptedRequest>
    where
        P: Fn(&InterceptedRequest) -> bool,
    {
        self.inner
            .lock()
            .entries
            .iter()
            .find(|r| predicate(r))
            .cloned()
    }

    /// First call whose path equals `path`.
    pub fn first_with_path(&self, path: &str) -> Option<InterceptedRequest> {
        self.find(|r| r.path == path)
    }

    /// Calls no mock resolved.
    pub fn unmatched(&self) -> Vec<InterceptedRequest> {
        self.filter(|r| r.unmatched)
    }

    /// Number of recorded calls.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn request(method: Method, path: &str) -> MockRequest {
        MockRequest::new(method, &format!("http://localhost{}", path)).unwrap()
    }

    #[test]
    fn sequence_numbers_increase() {
        let log = InterceptionLog::new();
        assert_eq!(log.record(request(Method::GET, "/a"), 200, false), 1);
        assert_eq!(log.record(request(Method::POST, "/b"), 500, true), 2);
        assert_eq!(log.len(), 2);

        let first = log.first_with_path("/a").unwrap();
        assert_eq!(first.method, Method::GET);
        assert_eq!(first.sequence, 1);

        assert_eq!(log.unmatched().len(), 1);
        assert_eq!(log.unmatched()[0].path, "/b");
    }

    #[test]
    fn concurrent_records_get_unique_sequences() {
        let log = Arc::new(InterceptionLog::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        log.record(request(Method::GET, &format!("/t{}/{}", t, i)), 200, false);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let sequences: Vec<u64> = log.requests().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences.len(), 400);
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn filter_sees_only_recorded_calls() {
        let log = InterceptionLog::new();
        log.record(request(Method::GET, "/x"), 200, false);
        let before = log.filter(|r| r.method == Method::PATCH);
        log.record(request(Method::PATCH, "/x"), 200, false);
        assert!(before.is_empty());
        assert_eq!(log.filter(|r| r.method == Method::PATCH).len(), 1);
    }
}
