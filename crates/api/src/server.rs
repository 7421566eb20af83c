//! TCP server behind the lifecycle loop.

use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::lifecycle::WebServer;

/// How long `close` waits for in-flight requests to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

struct Running {
    shutdown: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

/// Serves the router with `axum::serve` on a background task.
#[derive(Default)]
pub struct AxumServer {
    running: Option<Running>,
}

impl AxumServer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebServer for AxumServer {
    async fn launch(&mut self, app: Router, config: &ServerConfig) -> AppResult<String> {
        let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|e| {
                AppError::InternalError(format!(
                    "Failed to bind {}:{}: {e}",
                    config.host, config.port
                ))
            })?;
        let addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        });

        self.running = Some(Running { shutdown, handle });

        let url = format!("http://{addr}{}/", config.root_path);
        tracing::info!(%addr, "Listening");
        Ok(url)
    }

    async fn close(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.shutdown.cancel();
        match tokio::time::timeout(DRAIN_TIMEOUT, running.handle).await {
            Ok(Ok(Ok(()))) => tracing::info!("Server closed"),
            Ok(Ok(Err(e))) => tracing::error!(error = %e, "Server exited with error"),
            Ok(Err(e)) => tracing::error!(error = %e, "Server task panicked"),
            Err(_) => tracing::warn!("Server did not drain in time"),
        }
    }

    fn open_browser(&self, url: &str) {
        let mut command = if cfg!(target_os = "macos") {
            Command::new("open")
        } else if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", ""]);
            c
        } else {
            Command::new("xdg-open")
        };
        command.arg(url);

        match command.spawn() {
            Ok(_) => tracing::info!(url, "Opened browser"),
            Err(e) => tracing::warn!(url, error = %e, "Failed to open browser"),
        }
    }
}
