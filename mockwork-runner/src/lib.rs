//! mockwork runner
//!
//! Drives a workflow host through one test run against a per-test mock
//! server.
//!
//! # Components
//!
//! - **Server**: hyper HTTP/1 server every outbound call of the host lands on
//! - **Host**: the [`WorkflowHost`](host::WorkflowHost) boundary and the
//!   in-process [`LocalWorkflowHost`](host::LocalWorkflowHost)
//! - **Runner**: the [`TestRunner`](runner::TestRunner) facade tests talk to
//! - **Observability**: tracing subscriber setup

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod host;
pub mod observability;
pub mod runner;
pub mod server;

pub use runner::{PendingBinding, TestRunner, TestRunnerBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::host::{
        HostContext, HostFuture, LocalWorkflowHost, TriggerRequest, WorkflowDefinition,
        WorkflowHost,
    };
    pub use crate::observability::init_test_tracing;
    pub use crate::runner::{TestRunner, TestRunnerBuilder};
    pub use mockwork_core::prelude::*;
}
