//! Identifiers for runners and generated upload endpoints.
//!
//! Identifier generation goes through an [`IdProvider`] so tests can use
//! predictable values while the harness defaults to random UUIDs.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Routing key isolating one test runner from every other runner.
///
/// Embedded in generated endpoint paths so that concurrent tests sharing a
/// process never address each other's sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunKey(String);

impl RunKey {
    /// Create a routing key from a UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.simple().to_string())
    }

    /// Create a routing key from an arbitrary string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of one generated chunked-upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(String);

impl EndpointId {
    /// Create an endpoint identifier from a UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.simple().to_string())
    }

    /// Parse an endpoint identifier taken from a request path segment.
    ///
    /// Returns `None` for segments that cannot have been generated.
    pub fn parse(segment: &str) -> Option<Self> {
        if segment.is_empty() || !segment.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(segment.to_ascii_lowercase()))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of fresh UUIDs.
pub trait IdProvider: Send + Sync {
    /// Produce the next UUID. Never returns a value twice.
    fn next_uuid(&self) -> Uuid;

    /// Check if this provider is deterministic.
    fn is_deterministic(&self) -> bool;
}

/// Random UUID v4 provider.
#[derive(Debug, Default)]
pub struct RandomIds;

impl RandomIds {
    /// Create a new random provider.
    pub fn new() -> Self {
        Self
    }
}

impl IdProvider for RandomIds {
    fn next_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }

    fn is_deterministic(&self) -> bool {
        false
    }
}

/// Deterministic provider for tests.
///
/// Hands out predetermined UUIDs first, then sequential UUIDs
/// (`00000000-0000-0000-0000-000000000001`, ...).
#[derive(Debug)]
pub struct SequentialIds {
    queued: Mutex<Vec<Uuid>>,
    counter: AtomicU64,
}

impl SequentialIds {
    /// Create a provider whose first UUID ends in `1`.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create a provider starting at the given counter value.
    pub fn starting_at(start: u64) -> Self {
        Self {
            queued: Mutex::new(Vec::new()),
            counter: AtomicU64::new(start),
        }
    }

    /// Create a provider that hands out `uuids` in order before counting.
    pub fn predetermined(uuids: Vec<Uuid>) -> Self {
        let mut reversed = uuids;
        reversed.reverse();
        Self {
            queued: Mutex::new(reversed),
            counter: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdProvider for SequentialIds {
    fn next_uuid(&self) -> Uuid {
        if let Some(uuid) = self.queued.lock().pop() {
            return uuid;
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Uuid::from_u128(u128::from(n))
    }

    fn is_deterministic(&self) -> bool {
        true
    }
}
