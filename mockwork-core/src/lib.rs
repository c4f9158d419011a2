//! mockwork core library
//!
//! Mock HTTP interception and protocol emulation for workflow tests.
//!
//! # Key Components
//!
//! - **Matcher**: declarative predicates over outbound calls
//! - **Response**: deferred response synthesis, evaluated per dispatch
//! - **Registry**: bindings plus one dynamic handler, dispatched in priority order
//! - **Chunked**: stateful emulation of a chunked-transfer upload protocol
//! - **Intercept**: append-only log of every outbound call
//! - **Monitor**: run and per-action status reported by the workflow host
//!
//! # Example
//!
//! ```
//! use mockwork_core::prelude::*;
//! use http::Method;
//!
//! let mut registry = MockRegistry::new();
//! registry
//!     .add(
//!         RequestMatcher::create()
//!             .using_get()
//!             .with_path(PathMatchType::Exact, "/api/v1/data"),
//!         ResponseBuilder::create().with_success(),
//!     )
//!     .unwrap();
//!
//! let request = MockRequest::new(Method::GET, "http://127.0.0.1/api/v1/data").unwrap();
//! assert_eq!(registry.dispatch(&request).unwrap().status.as_u16(), 200);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunked;
pub mod config;
pub mod error;
pub mod http;
pub mod ids;
pub mod intercept;
pub mod matcher;
pub mod monitor;
pub mod registry;
pub mod response;
pub mod settings;

pub use error::{MockworkError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::chunked::{
        ChunkedTransferConfig, ChunkedTransferEmulator, ContentRange, SessionSnapshot,
        SessionState,
    };
    pub use crate::config::HarnessConfig;
    pub use crate::error::{MockworkError, Result};
    pub use crate::http::{MockContent, MockRequest, MockResponse};
    pub use crate::ids::{EndpointId, IdProvider, RandomIds, RunKey, SequentialIds};
    pub use crate::intercept::{InterceptedRequest, InterceptionLog};
    pub use crate::matcher::{CompiledMatcher, PathMatchType, RequestMatcher};
    pub use crate::monitor::{
        ActionStatus, RunMonitor, RunResult, RunStatus, TriggerResponse,
    };
    pub use crate::registry::{MockBinding, MockRegistry, RequestHandler};
    pub use crate::response::ResponseBuilder;
    pub use crate::settings::Settings;
}
