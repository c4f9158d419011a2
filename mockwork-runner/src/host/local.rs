//! In-process reference host.
//!
//! Executes a [`WorkflowDefinition`] against the mock server: actions run in
//! order on a spawned task and report into the run monitor.

use super::client::{HyperOutbound, OutboundHttp, OutboundRequest, OutboundResponse};
use super::definition::{BodySource, HttpAction, TransferMode, WorkflowDefinition, parse_method};
use super::{HostContext, HostFuture, TriggerRequest, WorkflowHost};
use bytes::Bytes;
use http::header::{CONTENT_RANGE, HeaderName, HeaderValue, LOCATION, RANGE};
use http::{HeaderMap, Method, StatusCode};
use mockwork_core::chunked::{CHUNK_SIZE_HEADER, TRANSFER_MODE_CHUNKED, TRANSFER_MODE_HEADER};
use mockwork_core::error::{MockworkError, Result};
use mockwork_core::monitor::{ActionStatus, RunStatus, TriggerResponse};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Executes a JSON workflow definition in-process.
pub struct LocalWorkflowHost {
    definition: Arc<WorkflowDefinition>,
    client: Arc<dyn OutboundHttp>,
    context: Option<Arc<HostContext>>,
    runs: Mutex<Vec<JoinHandle<()>>>,
}

impl LocalWorkflowHost {
    /// Create a host for `definition`.
    pub fn new(definition: WorkflowDefinition) -> Self {
        Self {
            definition: Arc::new(definition),
            client: Arc::new(HyperOutbound::new()),
            context: None,
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Load the definition from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(WorkflowDefinition::from_file(path)?))
    }

    /// Use a specific outbound transport.
    pub fn with_client(mut self, client: Arc<dyn OutboundHttp>) -> Self {
        self.client = client;
        self
    }

    /// The executed definition.
    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }
}

impl WorkflowHost for LocalWorkflowHost {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn start<'a>(&'a mut self, ctx: HostContext) -> HostFuture<'a, ()> {
        Box::pin(async move {
            tracing::info!(
                workflow = %self.definition.name,
                actions = self.definition.actions.len(),
                mock_base_url = %ctx.mock_base_url,
                "Local workflow host started"
            );
            self.context = Some(Arc::new(ctx));
            Ok(())
        })
    }

    fn trigger<'a>(&'a self, request: TriggerRequest) -> HostFuture<'a, TriggerResponse> {
        Box::pin(async move {
            let ctx = self.context.clone().ok_or_else(|| MockworkError::Host {
                cause: "host was triggered before start".to_string(),
            })?;

            if let Some(required) = &self.definition.trigger.method {
                let required =
                    parse_method(required).map_err(|cause| MockworkError::InvalidWorkflow { cause })?;
                if request.method != required {
                    tracing::warn!(
                        expected = %required,
                        actual = %request.method,
                        "Trigger rejected: method not allowed"
                    );
                    let mut response = TriggerResponse::new(StatusCode::METHOD_NOT_ALLOWED, "");
                    if let Ok(allow) = HeaderValue::from_str(required.as_str()) {
                        response.headers.insert(http::header::ALLOW, allow);
                    }
                    return Ok(response);
                }
            }

            let status = StatusCode::from_u16(self.definition.trigger.response_status).map_err(
                |e| MockworkError::InvalidWorkflow {
                    cause: e.to_string(),
                },
            )?;

            ctx.monitor.set_run_status(RunStatus::Running)?;
            let handle = tokio::spawn(execute(
                Arc::clone(&self.definition),
                Arc::clone(&ctx),
                Arc::clone(&self.client),
                request.body,
            ));
            self.runs.lock().push(handle);

            Ok(TriggerResponse::new(status, ""))
        })
    }

    fn shutdown(&mut self) {
        let runs: Vec<_> = self.runs.lock().drain(..).collect();
        for run in runs {
            if !run.is_finished() {
                tracing::debug!(workflow = %self.definition.name, "Aborting unfinished run");
                run.abort();
            }
        }
        self.context = None;
    }
}

impl Drop for LocalWorkflowHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn execute(
    definition: Arc<WorkflowDefinition>,
    ctx: Arc<HostContext>,
    client: Arc<dyn OutboundHttp>,
    trigger_body: Bytes,
) {
    let monitor = &ctx.monitor;
    let mut outputs: HashMap<String, Bytes> = HashMap::new();
    let mut previous = ActionStatus::Succeeded;
    let mut failed = false;

    for action in &definition.actions {
        if !action.run_after.contains(&previous) {
            tracing::debug!(action = %action.name, previous = %previous, "Skipping action");
            report(monitor.set_action_status(&action.name, ActionStatus::Skipped));
            previous = ActionStatus::Skipped;
            continue;
        }

        report(monitor.set_action_status(&action.name, ActionStatus::Running));
        let body = resolve_body(&action.inputs.body, &trigger_body, &outputs);
        match run_http(&action.inputs, body, &ctx, client.as_ref()).await {
            Ok(output) => {
                tracing::debug!(action = %action.name, "Action succeeded");
                outputs.insert(action.name.clone(), output);
                report(monitor.set_action_status(&action.name, ActionStatus::Succeeded));
                previous = ActionStatus::Succeeded;
            }
            Err(e) => {
                tracing::warn!(action = %action.name, error = %e, "Action failed");
                report(monitor.fail_action(&action.name, e.to_string()));
                previous = ActionStatus::Failed;
                failed = true;
            }
        }
    }

    let status = if failed {
        RunStatus::Failed
    } else {
        RunStatus::Succeeded
    };
    tracing::info!(workflow = %definition.name, status = %status, "Run finished");
    report(monitor.set_run_status(status));
}

// A run that already timed out rejects further status updates.
fn report(result: Result<()>) {
    if let Err(e) = result {
        tracing::debug!(error = %e, "Ignored status update");
    }
}

fn resolve_body(source: &BodySource, trigger: &Bytes, outputs: &HashMap<String, Bytes>) -> Bytes {
    match source {
        BodySource::None => Bytes::new(),
        BodySource::TriggerBody => trigger.clone(),
        BodySource::ActionOutput { action } => outputs.get(action).cloned().unwrap_or_default(),
        BodySource::Json { value } => Bytes::from(value.to_string()),
    }
}

async fn run_http(
    inputs: &HttpAction,
    body: Bytes,
    ctx: &HostContext,
    client: &dyn OutboundHttp,
) -> Result<Bytes> {
    let method =
        parse_method(&inputs.method).map_err(|cause| MockworkError::InvalidWorkflow { cause })?;
    let url = resolve_url(&ctx.mock_base_url, &ctx.settings.expand(&inputs.path)?);

    let mut headers = HeaderMap::new();
    for (name, value) in &inputs.headers {
        let value = ctx.settings.expand(value)?;
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            MockworkError::InvalidWorkflow {
                cause: format!("invalid header name '{}': {}", name, e),
            }
        })?;
        let value = HeaderValue::from_str(&value).map_err(|e| MockworkError::InvalidWorkflow {
            cause: format!("invalid value for header '{}': {}", name, e),
        })?;
        headers.insert(name, value);
    }

    let request = OutboundRequest {
        method,
        url,
        headers,
        body,
    };

    match inputs.transfer_mode {
        TransferMode::Whole => {
            let response = send_with_retry(client, &request, inputs.retry_count).await?;
            ensure_success(&request, &response)?;
            Ok(response.body)
        }
        TransferMode::Chunked => chunked_upload(client, request, &ctx.mock_base_url, inputs.retry_count).await,
    }
}

fn resolve_url(base: &str, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else if target.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), target)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), target)
    }
}

async fn send_with_retry(
    client: &dyn OutboundHttp,
    request: &OutboundRequest,
    retries: u32,
) -> Result<OutboundResponse> {
    let mut attempt = 0;
    loop {
        let result = client.send(request.clone()).await;
        let retryable = match &result {
            Ok(response) => response.status.is_server_error(),
            Err(_) => true,
        };
        if !retryable || attempt >= retries {
            return result;
        }
        attempt += 1;
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            attempt,
            "Retrying outbound call"
        );
        tokio::time::sleep(Duration::from_millis(20 * u64::from(attempt))).await;
    }
}

fn ensure_success(request: &OutboundRequest, response: &OutboundResponse) -> Result<()> {
    if response.status.is_success() {
        return Ok(());
    }
    Err(MockworkError::Host {
        cause: format!(
            "{} {} returned HTTP {}: {}",
            request.method,
            request.url,
            response.status.as_u16(),
            String::from_utf8_lossy(&response.body)
        ),
    })
}

async fn chunked_upload(
    client: &dyn OutboundHttp,
    request: OutboundRequest,
    base_url: &str,
    retries: u32,
) -> Result<Bytes> {
    let protocol = |cause: String| MockworkError::Host { cause };

    // A Content-Range cannot describe zero bytes.
    if request.body.is_empty() {
        return Err(protocol("chunked transfer needs a non-empty payload".to_string()));
    }

    let mut initiate = OutboundRequest::new(request.method.clone(), request.url.clone());
    initiate.headers = request.headers.clone();
    initiate.headers.insert(
        HeaderName::from_static(TRANSFER_MODE_HEADER),
        HeaderValue::from_static(TRANSFER_MODE_CHUNKED),
    );

    let opened = send_with_retry(client, &initiate, retries).await?;
    ensure_success(&initiate, &opened)?;

    let location = opened
        .header(LOCATION.as_str())
        .map(|l| resolve_url(base_url, l))
        .ok_or_else(|| protocol("initiate response carried no Location header".to_string()))?;
    let chunk_size = opened
        .header(CHUNK_SIZE_HEADER)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&n| n > 0)
        .ok_or_else(|| protocol("initiate response carried no usable chunk-size".to_string()))?;

    let payload = request.body;
    let total = payload.len() as u64;
    tracing::debug!(location = %location, chunk_size, total, "Starting chunked upload");

    let mut offset = 0u64;
    let mut last = opened;
    while offset < total {
        let end = (offset + chunk_size).min(total) - 1;
        let mut chunk = OutboundRequest::new(Method::PATCH, location.clone());
        chunk.headers = request.headers.clone();
        let range = HeaderValue::from_str(&format!("bytes {}-{}/{}", offset, end, total))
            .map_err(|e| protocol(e.to_string()))?;
        chunk.headers.insert(CONTENT_RANGE, range);
        chunk.body = payload.slice(offset as usize..=end as usize);

        let response = send_with_retry(client, &chunk, retries).await?;
        ensure_success(&chunk, &response)?;

        let confirmed = response
            .header(RANGE.as_str())
            .and_then(parse_confirmed_range)
            .unwrap_or(end);
        if confirmed < offset {
            return Err(protocol(format!(
                "server confirmed bytes up to {} after sending from {}",
                confirmed, offset
            )));
        }
        offset = confirmed + 1;
        last = response;
    }

    Ok(last.body)
}

// `bytes=0-<to>` -> `to`
fn parse_confirmed_range(value: &str) -> Option<u64> {
    let (_, to) = value.trim().strip_prefix("bytes=")?.split_once('-')?;
    to.trim().parse().ok()
}
