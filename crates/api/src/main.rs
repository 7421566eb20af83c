use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webui_api::config::{CmdOpts, ServerConfig};
use webui_api::lifecycle::ServerLifecycle;
use webui_api::server::AxumServer;
use webui_api::state::Services;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let opts = CmdOpts::parse();

    // --- Tracing ---
    let default_filter = if opts.gradio_debug {
        "webui_api=debug,webui_pipeline=debug,webui_core=debug,webui=info,tower_http=debug"
    } else {
        "webui_api=info,webui_pipeline=info,webui_core=info,webui=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = match ServerConfig::from_cmd_opts(&opts) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        host = %config.host,
        port = config.port,
        mode = ?config.mode,
        api = config.api,
        "Loaded server configuration",
    );

    // --- Services ---
    let services = Services::from_config(&config);

    // --- Interrupt ---
    let interrupt = CancellationToken::new();
    let signal_token = interrupt.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    // --- Lifecycle ---
    let lifecycle = ServerLifecycle::new(Arc::new(config), services, AxumServer::new())
        .with_interrupt(interrupt);

    match lifecycle.run().await {
        Ok(report) => {
            tracing::info!(starts = report.starts(), "Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
