//! Error types for mockwork.
//!
//! Every error carries a stable code (`E<nnn>`) so that failures surfaced to a
//! workflow host as HTTP error bodies can be correlated with harness logs.
//! Dispatch and protocol errors are normally translated into HTTP responses;
//! only setup, timeout and infrastructure errors reach the calling test.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for mockwork operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MockworkError {
    // =========================================================================
    // Dispatch Errors (E100-E199)
    // =========================================================================
    /// No dynamic handler or binding resolved an outbound call.
    #[error("E101: No mock response matched {method} {uri}")]
    UnmatchedRequest {
        /// HTTP method of the unmatched call.
        method: String,
        /// Absolute URI of the unmatched call.
        uri: String,
    },

    // =========================================================================
    // Chunked Transfer Errors (E200-E299)
    // =========================================================================
    /// A chunk started somewhere other than the session's next expected offset.
    #[error("E201: Range mismatch on endpoint {endpoint}: expected offset {expected}, got {actual}")]
    RangeMismatch {
        /// The generated endpoint identifier.
        endpoint: String,
        /// Offset the session was waiting for.
        expected: u64,
        /// Offset the request declared.
        actual: u64,
    },

    /// Body length disagrees with the declared byte range.
    #[error("E202: Chunk on endpoint {endpoint} declared {declared} bytes but carried {actual}")]
    ChunkLengthMismatch {
        /// The generated endpoint identifier.
        endpoint: String,
        /// Length implied by the Content-Range header.
        declared: u64,
        /// Actual body length.
        actual: u64,
    },

    /// Total size changed between chunks of one upload.
    #[error("E203: Total size on endpoint {endpoint} changed from {expected} to {actual}")]
    TotalMismatch {
        /// The generated endpoint identifier.
        endpoint: String,
        /// Total declared by earlier chunks.
        expected: u64,
        /// Total declared by this chunk.
        actual: u64,
    },

    /// Content-Range header missing or malformed.
    #[error("E204: Invalid Content-Range '{value}': {cause}")]
    InvalidContentRange {
        /// Raw header value (empty when missing).
        value: String,
        /// Why the value was rejected.
        cause: String,
    },

    /// The session no longer accepts chunks.
    #[error("E205: Upload session {endpoint} is {state} and accepts no further chunks")]
    SessionClosed {
        /// The generated endpoint identifier.
        endpoint: String,
        /// Current session state.
        state: String,
    },

    /// No session exists for the addressed endpoint.
    #[error("E206: Unknown upload session {endpoint}")]
    UnknownSession {
        /// The generated endpoint identifier.
        endpoint: String,
    },

    // =========================================================================
    // Run Errors (E300-E399)
    // =========================================================================
    /// The run did not complete in the allotted time.
    #[error("E301: Workflow run did not complete within {timeout_ms}ms")]
    Timeout {
        /// The allotted duration in milliseconds.
        timeout_ms: u64,
    },

    /// A runner can trigger exactly one execution.
    #[error("E302: Workflow already triggered for run {run_key}")]
    AlreadyTriggered {
        /// Routing key of the runner.
        run_key: String,
    },

    /// A status update would move a terminal status.
    #[error("E303: Illegal status transition for {subject}: {from} -> {to}")]
    IllegalTransition {
        /// The run or action name.
        subject: String,
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    // =========================================================================
    // Configuration Errors (E400-E499)
    // =========================================================================
    /// A matcher could not be compiled.
    #[error("E401: Invalid matcher pattern '{pattern}': {cause}")]
    InvalidMatcher {
        /// The offending pattern.
        pattern: String,
        /// Compilation failure.
        cause: String,
    },

    /// A second dynamic handler was registered.
    #[error("E402: A dynamic handler is already registered")]
    DuplicateDynamicHandler,

    /// Registry mutation after the run was triggered.
    #[error("E403: Mock registry is sealed; configure mocks before triggering")]
    RegistrySealed,

    /// Missing or invalid configuration value.
    #[error("E404: Invalid configuration for '{key}': {cause}")]
    ConfigValue {
        /// The configuration key.
        key: String,
        /// Why the value is invalid.
        cause: String,
    },

    /// Settings file could not be loaded.
    #[error("E405: Failed to load settings from {path}: {cause}")]
    SettingsFile {
        /// Settings file path.
        path: PathBuf,
        /// Reason for the failure.
        cause: String,
    },

    /// Workflow definition is invalid.
    #[error("E406: Invalid workflow definition: {cause}")]
    InvalidWorkflow {
        /// What is wrong with it.
        cause: String,
    },

    // =========================================================================
    // Infrastructure Errors (E500-E599)
    // =========================================================================
    /// I/O failure.
    #[error("E501: I/O error at {path}: {cause}")]
    Io {
        /// Path or address involved.
        path: PathBuf,
        /// Reason for the failure.
        cause: String,
    },

    /// Network failure.
    #[error("E502: Network error: {cause}")]
    Network {
        /// Reason for the failure.
        cause: String,
    },

    /// The workflow host failed.
    #[error("E503: Workflow host error: {cause}")]
    Host {
        /// Reason for the failure.
        cause: String,
    },
}

impl MockworkError {
    /// Get the error code (e.g., "E101").
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnmatchedRequest { .. } => "E101",
            Self::RangeMismatch { .. } => "E201",
            Self::ChunkLengthMismatch { .. } => "E202",
            Self::TotalMismatch { .. } => "E203",
            Self::InvalidContentRange { .. } => "E204",
            Self::SessionClosed { .. } => "E205",
            Self::UnknownSession { .. } => "E206",
            Self::Timeout { .. } => "E301",
            Self::AlreadyTriggered { .. } => "E302",
            Self::IllegalTransition { .. } => "E303",
            Self::InvalidMatcher { .. } => "E401",
            Self::DuplicateDynamicHandler => "E402",
            Self::RegistrySealed => "E403",
            Self::ConfigValue { .. } => "E404",
            Self::SettingsFile { .. } => "E405",
            Self::InvalidWorkflow { .. } => "E406",
            Self::Io { .. } => "E501",
            Self::Network { .. } => "E502",
            Self::Host { .. } => "E503",
        }
    }

    /// HTTP status a simulated dependency answers with for this error.
    pub fn http_status(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Self::UnmatchedRequest { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RangeMismatch { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::ChunkLengthMismatch { .. }
            | Self::TotalMismatch { .. }
            | Self::InvalidContentRange { .. } => StatusCode::BAD_REQUEST,
            Self::SessionClosed { .. } => StatusCode::CONFLICT,
            Self::UnknownSession { .. } => StatusCode::NOT_FOUND,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error is raised at setup time rather than during a run.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMatcher { .. }
                | Self::DuplicateDynamicHandler
                | Self::RegistrySealed
                | Self::ConfigValue { .. }
                | Self::SettingsFile { .. }
                | Self::InvalidWorkflow { .. }
        )
    }
}

/// Result type alias for mockwork operations.
pub type Result<T> = std::result::Result<T, MockworkError>;
