//! Test runner facade.
//!
//! A [`TestRunner`] owns everything one test needs: a mock server on its own
//! port, the registry it dispatches from, the interception log, the run
//! monitor and the workflow host. Dropping the runner tears all of it down.
//!
//! # Example
//!
//! ```ignore
//! let host = LocalWorkflowHost::from_file("fixtures/workflow.json")?;
//! let mut runner = TestRunner::create(host, HashMap::new()).await?;
//!
//! runner
//!     .add_mock_response(
//!         RequestMatcher::create()
//!             .using_get()
//!             .with_path(PathMatchType::Exact, "/api/v1/data"),
//!     )?
//!     .respond_with(ResponseBuilder::create().with_success())?;
//!
//! let result = runner.trigger_json(&json!({})).await?;
//! assert_eq!(result.status, RunStatus::Succeeded);
//! ```

use crate::host::{HostContext, TriggerRequest, WorkflowHost};
use crate::server::{MockServer, ServerState};
use bytes::Bytes;
use http::{HeaderMap, Method};
use mockwork_core::chunked::{ChunkedTransferConfig, ChunkedTransferEmulator};
use mockwork_core::config::HarnessConfig;
use mockwork_core::error::{MockworkError, Result};
use mockwork_core::ids::{IdProvider, RandomIds, RunKey};
use mockwork_core::intercept::{InterceptedRequest, InterceptionLog};
use mockwork_core::matcher::{CompiledMatcher, RequestMatcher};
use mockwork_core::monitor::{ActionStatus, RunMonitor, RunResult, RunStatus, TriggerResponse};
use mockwork_core::registry::{MockBinding, MockRegistry, RequestHandler};
use mockwork_core::response::ResponseBuilder;
use mockwork_core::settings::{MOCK_SERVER_BASE_URL, Settings};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Builder for configuring a [`TestRunner`].
pub struct TestRunnerBuilder {
    host: Box<dyn WorkflowHost>,
    settings_file: Option<PathBuf>,
    overrides: HashMap<String, String>,
    config: HarnessConfig,
    ids: Option<Arc<dyn IdProvider>>,
}

impl TestRunnerBuilder {
    /// Create a builder driving `host`.
    pub fn new(host: impl WorkflowHost + 'static) -> Self {
        Self {
            host: Box::new(host),
            settings_file: None,
            overrides: HashMap::new(),
            config: HarnessConfig::default(),
            ids: None,
        }
    }

    /// Load base settings from a `local.settings.json`-style file.
    pub fn with_settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_file = Some(path.into());
        self
    }

    /// Override one setting.
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Override several settings.
    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.overrides.extend(overrides);
        self
    }

    /// Use specific harness configuration.
    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a specific identifier source for the routing key and endpoint ids.
    pub fn with_id_provider(mut self, ids: Arc<dyn IdProvider>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Start the mock server and the host.
    pub async fn build(self) -> Result<TestRunner> {
        let ids = self.ids.unwrap_or_else(|| Arc::new(RandomIds::new()));
        let run_key = RunKey::from_uuid(ids.next_uuid());

        let mut settings = match &self.settings_file {
            Some(path) => Settings::from_file(path)?,
            None => Settings::new(),
        };
        settings.apply_overrides(&self.overrides);

        let registry = Arc::new(RwLock::new(MockRegistry::new()));
        let log = Arc::new(InterceptionLog::new());
        let state = Arc::new(ServerState::new(Arc::clone(&registry), Arc::clone(&log)));
        let server = MockServer::start(&self.config.bind_host, state).await?;
        let settings = settings.with_value(MOCK_SERVER_BASE_URL, server.base_url());

        let monitor = Arc::new(RunMonitor::new());
        let mut host = self.host;
        host.start(HostContext {
            settings: settings.clone(),
            mock_base_url: server.base_url().to_string(),
            monitor: Arc::clone(&monitor),
        })
        .await?;

        tracing::info!(
            run_key = %run_key,
            host = host.name(),
            mock_base_url = %server.base_url(),
            "Test runner created"
        );

        Ok(TestRunner {
            run_key,
            config: self.config,
            settings,
            registry,
            log,
            monitor,
            server: Some(server),
            host: Some(host),
            emulator: None,
            ids,
            triggered: false,
            disposed: false,
        })
    }
}

/// A matcher waiting for its response.
#[must_use = "a mock response is only registered by respond_with"]
pub struct PendingBinding<'a> {
    registry: &'a RwLock<MockRegistry>,
    matcher: CompiledMatcher,
}

impl PendingBinding<'_> {
    /// Register the binding.
    pub fn respond_with(self, response: ResponseBuilder) -> Result<()> {
        self.registry
            .write()
            .add_binding(MockBinding::new(self.matcher, response))
    }
}

/// Scoped harness for one workflow run.
pub struct TestRunner {
    run_key: RunKey,
    config: HarnessConfig,
    settings: Settings,
    registry: Arc<RwLock<MockRegistry>>,
    log: Arc<InterceptionLog>,
    monitor: Arc<RunMonitor>,
    server: Option<MockServer>,
    host: Option<Box<dyn WorkflowHost>>,
    emulator: Option<Arc<ChunkedTransferEmulator>>,
    ids: Arc<dyn IdProvider>,
    triggered: bool,
    disposed: bool,
}

impl TestRunner {
    /// Create a runner with default configuration and the given setting overrides.
    pub async fn create(
        host: impl WorkflowHost + 'static,
        overrides: HashMap<String, String>,
    ) -> Result<Self> {
        TestRunnerBuilder::new(host)
            .with_overrides(overrides)
            .build()
            .await
    }

    /// Start configuring a runner.
    pub fn builder(host: impl WorkflowHost + 'static) -> TestRunnerBuilder {
        TestRunnerBuilder::new(host)
    }

    /// Routing key isolating this runner.
    pub fn run_key(&self) -> &RunKey {
        &self.run_key
    }

    /// Base URL of the mock server, empty after disposal.
    pub fn mock_base_url(&self) -> &str {
        self.server.as_ref().map_or("", |s| s.base_url())
    }

    /// Settings handed to the host.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Start registering a mock response.
    ///
    /// The matcher is compiled immediately; malformed patterns fail here.
    pub fn add_mock_response(&self, matcher: RequestMatcher) -> Result<PendingBinding<'_>> {
        if self.registry.read().is_sealed() {
            return Err(MockworkError::RegistrySealed);
        }
        Ok(PendingBinding {
            registry: &self.registry,
            matcher: matcher.compile()?,
        })
    }

    /// Register the dynamic handler consulted before any binding.
    pub fn set_dynamic_handler(&self, handler: Arc<dyn RequestHandler>) -> Result<()> {
        self.registry.write().set_dynamic_handler(handler)
    }

    /// Emulate chunked uploads initiated by requests matching `upload`, using
    /// the configured chunk size.
    pub fn enable_chunked_transfer(
        &mut self,
        upload: RequestMatcher,
    ) -> Result<Arc<ChunkedTransferEmulator>> {
        let config = ChunkedTransferConfig::new(upload).with_chunk_size(self.config.chunk_size);
        self.enable_chunked_transfer_with(config)
    }

    /// Emulate chunked uploads with explicit configuration.
    ///
    /// The emulator occupies the dynamic handler slot.
    pub fn enable_chunked_transfer_with(
        &mut self,
        config: ChunkedTransferConfig,
    ) -> Result<Arc<ChunkedTransferEmulator>> {
        let emulator = Arc::new(
            ChunkedTransferEmulator::new(config, self.mock_base_url(), self.run_key.clone())?
                .with_id_provider(Arc::clone(&self.ids)),
        );
        self.registry
            .write()
            .set_dynamic_handler(Arc::clone(&emulator) as Arc<dyn RequestHandler>)?;
        self.emulator = Some(Arc::clone(&emulator));
        Ok(emulator)
    }

    /// The chunked-transfer emulator, when enabled.
    pub fn chunked_transfer(&self) -> Option<Arc<ChunkedTransferEmulator>> {
        self.emulator.clone()
    }

    /// Send the trigger and wait for the run to finish.
    ///
    /// Registration is closed from here on. If the run does not finish within
    /// the configured timeout it is marked `TimedOut`, the runner is torn
    /// down and `Timeout` is returned.
    pub async fn trigger(
        &mut self,
        body: impl Into<Bytes>,
        method: Method,
        headers: HeaderMap,
    ) -> Result<RunResult> {
        let mut request = TriggerRequest::new(method).with_body(body);
        request.headers = headers;
        self.send_trigger(request).await
    }

    /// POST a JSON trigger body.
    pub async fn trigger_json(&mut self, body: &serde_json::Value) -> Result<RunResult> {
        self.send_trigger(TriggerRequest::new(Method::POST).with_json(body))
            .await
    }

    async fn send_trigger(&mut self, request: TriggerRequest) -> Result<RunResult> {
        if self.triggered {
            return Err(MockworkError::AlreadyTriggered {
                run_key: self.run_key.to_string(),
            });
        }
        let host = self.host.as_deref().ok_or_else(|| MockworkError::Host {
            cause: "runner has been disposed".to_string(),
        })?;
        self.triggered = true;
        self.registry.write().seal();

        tracing::info!(run_key = %self.run_key, method = %request.method, "Triggering run");

        let monitor = Arc::clone(&self.monitor);
        let timeout = self.config.run_timeout;
        let outcome = tokio::time::timeout(timeout, async {
            let response = host.trigger(request).await?;
            monitor.set_trigger_response(response.clone());
            if monitor.overall_status() != RunStatus::NotTriggered {
                monitor.wait_for_completion().await;
            }
            Ok::<TriggerResponse, MockworkError>(response)
        })
        .await;

        match outcome {
            Ok(Ok(response)) => {
                let result = self.monitor.result(response);
                tracing::info!(
                    run_key = %self.run_key,
                    status = %result.status,
                    "Run finished"
                );
                Ok(result)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                if let Err(e) = self.monitor.set_run_status(RunStatus::TimedOut) {
                    tracing::debug!(error = %e, "Run finished while timing out");
                }
                tracing::warn!(
                    run_key = %self.run_key,
                    timeout_ms = timeout.as_millis() as u64,
                    "Run timed out"
                );
                self.teardown();
                Err(MockworkError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Overall status of the run.
    pub fn workflow_run_status(&self) -> RunStatus {
        self.monitor.overall_status()
    }

    /// Status of a named action; `NotStarted` when it never executed.
    pub fn action_status(&self, name: &str) -> ActionStatus {
        self.monitor.action_status(name)
    }

    /// Response to the trigger request, once sent.
    pub fn trigger_response(&self) -> Option<TriggerResponse> {
        self.monitor.trigger_response()
    }

    /// Snapshot of every intercepted call, in arrival order.
    pub fn mock_requests(&self) -> Vec<InterceptedRequest> {
        self.log.requests()
    }

    /// The interception log.
    pub fn interception_log(&self) -> Arc<InterceptionLog> {
        Arc::clone(&self.log)
    }

    /// The run monitor.
    pub fn monitor(&self) -> Arc<RunMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Check whether the runner has been torn down.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Release the server, sessions, registry and host.
    pub fn dispose(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Some(mut host) = self.host.take() {
            host.shutdown();
        }
        if let Some(mut server) = self.server.take() {
            server.shutdown();
        }
        if let Some(emulator) = self.emulator.take() {
            emulator.close_all();
        }
        self.registry.write().clear();

        tracing::info!(run_key = %self.run_key, "Test runner disposed");
    }
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        self.teardown();
    }
}
