//! Harness configuration.

use crate::chunked::DEFAULT_CHUNK_SIZE;
use std::env;
use std::time::Duration;

/// Knobs shared by every test runner.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// Address the per-runner mock server binds to.
    pub bind_host: String,
    /// Upper bound on trigger + run duration.
    pub run_timeout: Duration,
    /// Chunk size announced by the chunked-transfer emulator.
    pub chunk_size: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            run_timeout: Duration::from_secs(30),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl HarnessConfig {
    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MOCKWORK_BIND_HOST`: mock server bind address (default `127.0.0.1`)
    /// - `MOCKWORK_RUN_TIMEOUT_SECS`: run timeout in seconds (default 30)
    /// - `MOCKWORK_CHUNK_SIZE`: announced chunk size in bytes (default 512)
    ///
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_host = env::var("MOCKWORK_BIND_HOST").unwrap_or(defaults.bind_host);

        let run_timeout = env::var("MOCKWORK_RUN_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.run_timeout);

        let chunk_size = env::var("MOCKWORK_CHUNK_SIZE")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.chunk_size);

        Self {
            bind_host,
            run_timeout,
            chunk_size,
        }
    }

    /// Set the bind address.
    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    /// Set the run timeout.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Set the announced chunk size.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}
