//! Logging setup for mockwork.
//!
//! Log format is controlled via `MOCKWORK_LOG_FORMAT`:
//! - `json` - structured JSON output
//! - `pretty` - human-readable multi-line output
//! - `compact` - single-line output (default)
//!
//! The filter comes from `MOCKWORK_LOG`, then `RUST_LOG`, then `info`.
//!
//! # Example
//!
//! ```ignore
//! use mockwork_runner::observability::{TracingConfig, init_tracing};
//!
//! let _guard = init_tracing(TracingConfig::from_env())?;
//! ```
//!
//! Tests call [`init_test_tracing`] instead, which may be called any number of
//! times and routes output through the test harness capture.

mod config;
mod tracing_setup;

pub use config::{LogFormat, TracingConfig, TracingConfigBuilder};
pub use tracing_setup::{TracingGuard, init_test_tracing, init_tracing};
