//! Per-runner mock HTTP server.
//!
//! Every outbound call the workflow host makes lands here. The server turns
//! it into a [`MockRequest`](mockwork_core::http::MockRequest), dispatches it
//! against the runner's registry, records it in the interception log and
//! writes the synthesized response back.

mod router;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use mockwork_core::error::{MockworkError, Result};
use mockwork_core::intercept::InterceptionLog;
use mockwork_core::registry::MockRegistry;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};

/// State shared by every connection of one server.
#[derive(Debug)]
pub struct ServerState {
    /// Dispatch table.
    pub registry: Arc<RwLock<MockRegistry>>,
    /// Record of every call received.
    pub log: Arc<InterceptionLog>,
    base_url: RwLock<String>,
}

impl ServerState {
    /// Create state around a registry and a log.
    pub fn new(registry: Arc<RwLock<MockRegistry>>, log: Arc<InterceptionLog>) -> Self {
        Self {
            registry,
            log,
            base_url: RwLock::new(String::new()),
        }
    }

    /// Base URL the server answers on, once bound.
    pub fn base_url(&self) -> String {
        self.base_url.read().clone()
    }
}

/// A running mock server bound to an ephemeral port.
pub struct MockServer {
    addr: SocketAddr,
    base_url: String,
    state: Arc<ServerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Bind to `host` on an ephemeral port and start accepting connections.
    pub async fn start(host: &str, state: Arc<ServerState>) -> Result<Self> {
        let listener = TcpListener::bind((host, 0))
            .await
            .map_err(|e| MockworkError::Io {
                path: std::path::PathBuf::from(format!("{}:0", host)),
                cause: e.to_string(),
            })?;
        let addr = listener.local_addr().map_err(|e| MockworkError::Network {
            cause: e.to_string(),
        })?;
        let base_url = format!("http://{}", addr);
        *state.base_url.write() = base_url.clone();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(accept_loop(listener, Arc::clone(&state), shutdown_rx));

        tracing::info!(address = %addr, "Mock server started");

        Ok(Self {
            addr,
            base_url,
            state,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Socket address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, e.g. `http://127.0.0.1:40123`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Shared state.
    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Stop accepting connections and close open ones.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Check whether the accept loop is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    // Dropping the set aborts every connection, including when this task is aborted.
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, remote_addr) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept mock server connection");
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let state = Arc::clone(&state);

                connections.spawn(async move {
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { router::route(req, state).await }
                    });

                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        if !e.is_incomplete_message() {
                            tracing::warn!(
                                remote = %remote_addr,
                                error = %e,
                                "Mock server connection error"
                            );
                        }
                    }
                });
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = &mut shutdown_rx => {
                tracing::info!(open = connections.len(), "Mock server shutting down");
                connections.abort_all();
                break;
            }
        }
    }
}
