//! Upload session state machine.

use super::range::ContentRange;
use crate::error::{MockworkError, Result};
use crate::ids::EndpointId;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one chunked upload. A missing session is the idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Endpoint allocated, no bytes received.
    Opened,
    /// At least one chunk accepted.
    Receiving,
    /// Final chunk accepted. Terminal.
    Completed,
    /// Protocol violation observed. Terminal until reset.
    Errored,
}

impl SessionState {
    /// Whether the session still accepts chunks.
    pub fn accepts_chunks(self) -> bool {
        matches!(self, Self::Opened | Self::Receiving)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Opened => "opened",
            Self::Receiving => "receiving",
            Self::Completed => "completed",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Accumulated state of one in-progress upload.
#[derive(Debug)]
pub struct ChunkUploadSession {
    id: EndpointId,
    chunk_size: u64,
    buffer: BytesMut,
    next_offset: u64,
    total: Option<u64>,
    state: SessionState,
    chunks: usize,
    last_error: Option<MockworkError>,
}

impl ChunkUploadSession {
    /// Open a session.
    pub fn new(id: EndpointId, chunk_size: u64) -> Self {
        Self {
            id,
            chunk_size,
            buffer: BytesMut::new(),
            next_offset: 0,
            total: None,
            state: SessionState::Opened,
            chunks: 0,
            last_error: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Offset the next chunk must start at.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Accept one chunk, or move to `Errored` on a protocol violation.
    ///
    /// Returns the cumulative inclusive end offset on success.
    pub fn append(&mut self, range: ContentRange, body: &[u8]) -> Result<u64> {
        if !self.state.accepts_chunks() {
            return Err(MockworkError::SessionClosed {
                endpoint: self.id.to_string(),
                state: self.state.to_string(),
            });
        }

        if let Some(total) = self.total {
            if total != range.total() {
                return self.fail(MockworkError::TotalMismatch {
                    endpoint: self.id.to_string(),
                    expected: total,
                    actual: range.total(),
                });
            }
        }

        if range.from() != self.next_offset {
            return self.fail(MockworkError::RangeMismatch {
                endpoint: self.id.to_string(),
                expected: self.next_offset,
                actual: range.from(),
            });
        }

        if body.len() as u64 != range.byte_count() {
            return self.fail(MockworkError::ChunkLengthMismatch {
                endpoint: self.id.to_string(),
                declared: range.byte_count(),
                actual: body.len() as u64,
            });
        }

        self.buffer.extend_from_slice(body);
        self.next_offset = range.to() + 1;
        self.total = Some(range.total());
        self.chunks += 1;
        self.state = if range.is_final() {
            SessionState::Completed
        } else {
            SessionState::Receiving
        };
        Ok(range.to())
    }

    /// Return an errored (or any) session to `Opened` with an empty buffer.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.next_offset = 0;
        self.total = None;
        self.state = SessionState::Opened;
        self.chunks = 0;
        self.last_error = None;
    }

    /// Point-in-time copy of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            state: self.state,
            chunk_size: self.chunk_size,
            next_offset: self.next_offset,
            total: self.total,
            chunks: self.chunks,
            bytes: Bytes::copy_from_slice(&self.buffer),
            last_error: self.last_error.clone(),
        }
    }

    fn fail(&mut self, err: MockworkError) -> Result<u64> {
        tracing::warn!(endpoint = %self.id, error = %err, "Chunked upload protocol violation");
        self.state = SessionState::Errored;
        self.last_error = Some(err.clone());
        Err(err)
    }
}

/// Immutable view of a session for assertions.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Endpoint identifier.
    pub id: EndpointId,
    /// State at snapshot time.
    pub state: SessionState,
    /// Chunk size announced to the client.
    pub chunk_size: u64,
    /// Offset the next chunk must start at.
    pub next_offset: u64,
    /// Declared total, once the first chunk arrived.
    pub total: Option<u64>,
    /// Number of accepted chunks.
    pub chunks: usize,
    /// Bytes accepted so far.
    pub bytes: Bytes,
    /// The violation that errored the session.
    pub last_error: Option<MockworkError>,
}
