//! Chunked-transfer upload emulation.
//!
//! Emulates the server side of a resumable upload protocol split over several
//! requests:
//!
//! | Step | Request | Response |
//! |---|---|---|
//! | Initiate | `POST <upload path>` with `transfer-mode: chunked` | 200, `Location: <absolute endpoint uri>`, `chunk-size: <n>` |
//! | Append | `PATCH <endpoint>` with `Content-Range: bytes <from>-<to>/<total>` | 200, `Range: bytes=0-<to>` |
//! | Final append | as Append with `to + 1 == total` | 200, session completed |
//!
//! Generated endpoints live under `/chunked/<run key>/<endpoint id>`. Requests
//! carrying another runner's key are not handled here and fall through to the
//! registry.
//!
//! ```text
//!          initiate           chunk             final chunk
//!   Idle ───────────▶ Opened ──────▶ Receiving ─────────────▶ Completed
//!                       │               │
//!                       └──── gap / overlap ────▶ Errored
//! ```

mod range;
mod session;

pub use range::ContentRange;
pub use session::{ChunkUploadSession, SessionSnapshot, SessionState};

use crate::error::{MockworkError, Result};
use crate::http::{MockRequest, MockResponse};
use crate::ids::{EndpointId, IdProvider, RandomIds, RunKey};
use crate::matcher::{CompiledMatcher, RequestMatcher};
use crate::registry::RequestHandler;
use bytes::Bytes;
use http::header::{ALLOW, CONTENT_RANGE, LOCATION, RANGE};
use http::{Method, StatusCode};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

/// Header marking an initiating request as chunked.
pub const TRANSFER_MODE_HEADER: &str = "transfer-mode";

/// Marker value of [`TRANSFER_MODE_HEADER`].
pub const TRANSFER_MODE_CHUNKED: &str = "chunked";

/// Header announcing the chunk size on the initiate response.
pub const CHUNK_SIZE_HEADER: &str = "chunk-size";

/// Chunk size announced when none is configured.
pub const DEFAULT_CHUNK_SIZE: u64 = 512;

/// Path prefix of generated endpoints.
pub const ENDPOINT_PREFIX: &str = "/chunked";

/// Configuration of the emulator.
#[derive(Debug, Clone)]
pub struct ChunkedTransferConfig {
    upload: RequestMatcher,
    chunk_size: u64,
}

impl ChunkedTransferConfig {
    /// Emulate chunked uploads initiated by requests matching `upload`.
    pub fn new(upload: RequestMatcher) -> Self {
        Self {
            upload,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the announced chunk size.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// Stateful handler for the chunked upload protocol.
pub struct ChunkedTransferEmulator {
    upload: CompiledMatcher,
    chunk_size: u64,
    base_url: String,
    run_key: RunKey,
    ids: Arc<dyn IdProvider>,
    sessions: RwLock<HashMap<EndpointId, Arc<Mutex<ChunkUploadSession>>>>,
}

impl fmt::Debug for ChunkedTransferEmulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedTransferEmulator")
            .field("run_key", &self.run_key)
            .field("chunk_size", &self.chunk_size)
            .field("upload", &self.upload)
            .field("sessions", &self.sessions.read().len())
            .finish()
    }
}

impl ChunkedTransferEmulator {
    /// Create an emulator whose generated endpoints are rooted at `base_url`.
    pub fn new(config: ChunkedTransferConfig, base_url: &str, run_key: RunKey) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(MockworkError::ConfigValue {
                key: CHUNK_SIZE_HEADER.to_string(),
                cause: "chunk size must be positive".to_string(),
            });
        }
        Ok(Self {
            upload: config.upload.compile()?,
            chunk_size: config.chunk_size,
            base_url: base_url.trim_end_matches('/').to_string(),
            run_key,
            ids: Arc::new(RandomIds::new()),
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Use a specific identifier source.
    pub fn with_id_provider(mut self, ids: Arc<dyn IdProvider>) -> Self {
        self.ids = ids;
        self
    }

    /// Announced chunk size.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Path of a generated endpoint.
    pub fn endpoint_path(&self, id: &EndpointId) -> String {
        format!("{}/{}/{}", ENDPOINT_PREFIX, self.run_key, id)
    }

    /// Absolute URI of a generated endpoint.
    pub fn endpoint_uri(&self, id: &EndpointId) -> String {
        format!("{}{}", self.base_url, self.endpoint_path(id))
    }

    /// Allocate a fresh session and build the initiate response.
    pub fn open(&self) -> (EndpointId, MockResponse) {
        let id = {
            let mut sessions = self.sessions.write();
            loop {
                let candidate = EndpointId::from_uuid(self.ids.next_uuid());
                if let Entry::Vacant(slot) = sessions.entry(candidate.clone()) {
                    slot.insert(Arc::new(Mutex::new(ChunkUploadSession::new(
                        candidate.clone(),
                        self.chunk_size,
                    ))));
                    break candidate;
                }
            }
        };

        let location = self.endpoint_uri(&id);
        tracing::info!(endpoint = %id, location = %location, "Opened chunked upload session");

        let response = MockResponse::empty(StatusCode::OK)
            .with_header(LOCATION.as_str(), &location)
            .with_header(CHUNK_SIZE_HEADER, &self.chunk_size.to_string());
        (id, response)
    }

    /// Apply one chunk request to the session `id`.
    pub fn append(&self, id: &EndpointId, request: &MockRequest) -> MockResponse {
        match self.try_append(id, request) {
            Ok(to) => MockResponse::empty(StatusCode::OK)
                .with_header(RANGE.as_str(), &format!("bytes=0-{}", to)),
            Err(err) => MockResponse::from_error(&err),
        }
    }

    fn try_append(&self, id: &EndpointId, request: &MockRequest) -> Result<u64> {
        let session = self
            .sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| MockworkError::UnknownSession {
                endpoint: id.to_string(),
            })?;

        let raw = request.header(CONTENT_RANGE.as_str()).unwrap_or_default();
        let range: ContentRange = raw.parse()?;

        let mut session = session.lock();
        let to = session.append(range, &request.body)?;
        tracing::debug!(
            endpoint = %id,
            range = %range,
            state = %session.state(),
            "Accepted chunk"
        );
        if session.state() == SessionState::Completed {
            tracing::info!(endpoint = %id, total = range.total(), "Chunked upload completed");
        }
        Ok(to)
    }

    /// Snapshot of one session.
    pub fn session(&self, id: &EndpointId) -> Option<SessionSnapshot> {
        self.sessions.read().get(id).map(|s| s.lock().snapshot())
    }

    /// Snapshots of all sessions, ordered by identifier.
    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<SessionSnapshot> = self
            .sessions
            .read()
            .values()
            .map(|s| s.lock().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    /// Payloads of all completed sessions, ordered by identifier.
    pub fn completed_payloads(&self) -> Vec<Bytes> {
        self.sessions()
            .into_iter()
            .filter(|s| s.state == SessionState::Completed)
            .map(|s| s.bytes)
            .collect()
    }

    /// Explicitly reset a session back to `Opened`.
    pub fn reset(&self, id: &EndpointId) -> Result<()> {
        let sessions = self.sessions.read();
        let session = sessions.get(id).ok_or_else(|| MockworkError::UnknownSession {
            endpoint: id.to_string(),
        })?;
        session.lock().reset();
        tracing::info!(endpoint = %id, "Reset chunked upload session");
        Ok(())
    }

    /// Drop every session.
    pub fn close_all(&self) {
        let mut sessions = self.sessions.write();
        if !sessions.is_empty() {
            tracing::debug!(count = sessions.len(), "Closing chunked upload sessions");
        }
        sessions.clear();
    }

    // Extracts the endpoint id from a path under this runner's prefix.
    fn route(&self, path: &str) -> Option<Option<EndpointId>> {
        let rest = path
            .strip_prefix(ENDPOINT_PREFIX)?
            .strip_prefix('/')?
            .strip_prefix(self.run_key.as_str())?
            .strip_prefix('/')?;
        Some(EndpointId::parse(rest.trim_end_matches('/')))
    }

    fn is_initiate(&self, request: &MockRequest) -> bool {
        request.method == Method::POST
            && request
                .header(TRANSFER_MODE_HEADER)
                .is_some_and(|v| v.eq_ignore_ascii_case(TRANSFER_MODE_CHUNKED))
            && self.upload.matches(request)
    }
}

impl RequestHandler for ChunkedTransferEmulator {
    fn handle(&self, request: &MockRequest) -> Option<MockResponse> {
        if self.is_initiate(request) {
            return Some(self.open().1);
        }

        let routed = self.route(&request.path)?;
        let response = match routed {
            None => MockResponse::from_error(&MockworkError::UnknownSession {
                endpoint: request.path.clone(),
            }),
            Some(id) if request.method == Method::PATCH => self.append(&id, request),
            Some(_) => MockResponse::empty(StatusCode::METHOD_NOT_ALLOWED)
                .with_header(ALLOW.as_str(), "PATCH"),
        };
        Some(response)
    }
}

impl Drop for ChunkedTransferEmulator {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIds;
    use crate::matcher::PathMatchType;

    const BASE: &str = "http://127.0.0.1:4010";

    fn emulator() -> ChunkedTransferEmulator {
        let config = ChunkedTransferConfig::new(
            RequestMatcher::create().with_path(PathMatchType::Exact, "/api/v1.1/upload"),
        )
        .with_chunk_size(4);
        ChunkedTransferEmulator::new(config, BASE, RunKey::new("run1"))
            .unwrap()
            .with_id_provider(Arc::new(SequentialIds::new()))
    }

    fn initiate() -> MockRequest {
        MockRequest::new(Method::POST, &format!("{}/api/v1.1/upload", BASE))
            .unwrap()
            .with_header(TRANSFER_MODE_HEADER, TRANSFER_MODE_CHUNKED)
    }

    fn chunk(location: &str, range: &str, body: &'static [u8]) -> MockRequest {
        MockRequest::new(Method::PATCH, location)
            .unwrap()
            .with_header("content-range", range)
            .with_body(body)
    }

    #[test]
    fn initiate_returns_location_and_chunk_size() {
        let emu = emulator();
        let response = emu.handle(&initiate()).unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.header("location"),
            Some("http://127.0.0.1:4010/chunked/run1/00000000000000000000000000000001")
        );
        assert_eq!(response.header("chunk-size"), Some("4"));
        assert_eq!(emu.sessions()[0].state, SessionState::Opened);
    }

    #[test]
    fn upload_without_marker_is_not_handled() {
        let emu = emulator();
        let plain = MockRequest::new(Method::POST, &format!("{}/api/v1.1/upload", BASE)).unwrap();
        assert!(emu.handle(&plain).is_none());
    }

    #[test]
    fn chunks_echo_cumulative_range() {
        let emu = emulator();
        let location = emu.handle(&initiate()).unwrap().header("location").unwrap().to_string();

        let first = emu.handle(&chunk(&location, "bytes 0-3/6", b"abcd")).unwrap();
        assert_eq!(first.status, StatusCode::OK);
        assert_eq!(first.header("range"), Some("bytes=0-3"));

        let last = emu.handle(&chunk(&location, "bytes 4-5/6", b"ef")).unwrap();
        assert_eq!(last.header("range"), Some("bytes=0-5"));

        assert_eq!(emu.completed_payloads(), vec![Bytes::from_static(b"abcdef")]);
    }

    #[test]
    fn mismatch_fails_with_416() {
        let emu = emulator();
        let location = emu.handle(&initiate()).unwrap().header("location").unwrap().to_string();
        let response = emu.handle(&chunk(&location, "bytes 2-3/6", b"cd")).unwrap();
        assert_eq!(response.status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(emu.sessions()[0].state, SessionState::Errored);
    }

    #[test]
    fn malformed_range_is_400_without_state_change() {
        let emu = emulator();
        let location = emu.handle(&initiate()).unwrap().header("location").unwrap().to_string();
        let response = emu.handle(&chunk(&location, "garbage", b"cd")).unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(emu.sessions()[0].state, SessionState::Opened);
    }

    #[test]
    fn unknown_endpoint_under_own_prefix_is_404() {
        let emu = emulator();
        let uri = format!("{}/chunked/run1/00000000000000000000000000000099", BASE);
        let response = emu.handle(&chunk(&uri, "bytes 0-1/2", b"ab")).unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn foreign_routing_key_falls_through() {
        let emu = emulator();
        let uri = format!("{}/chunked/run2/00000000000000000000000000000001", BASE);
        assert!(emu.handle(&chunk(&uri, "bytes 0-1/2", b"ab")).is_none());
    }

    #[test]
    fn non_patch_to_endpoint_is_405() {
        let emu = emulator();
        let location = emu.handle(&initiate()).unwrap().header("location").unwrap().to_string();
        let get = MockRequest::new(Method::GET, &location).unwrap();
        let response = emu.handle(&get).unwrap();
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.header("allow"), Some("PATCH"));
    }

    #[test]
    fn reset_unknown_session_fails() {
        let emu = emulator();
        let id = EndpointId::from_uuid(uuid::Uuid::from_u128(42));
        assert_eq!(emu.reset(&id).unwrap_err().code(), "E206");
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let config = ChunkedTransferConfig::new(RequestMatcher::create()).with_chunk_size(0);
        assert!(ChunkedTransferEmulator::new(config, BASE, RunKey::new("r")).is_err());
    }

    #[test]
    fn debug_shows_run_key_and_session_count() {
        let emu = emulator();
        emu.handle(&initiate()).unwrap();
        let rendered = format!("{:?}", emu);
        assert!(rendered.contains("run1"));
        assert!(rendered.contains("chunk_size: 4"));
        assert!(rendered.contains("sessions: 1"));
    }
}
