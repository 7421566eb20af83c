//! Server lifecycle loop.
//!
//! ```text
//! Starting -> Running -> Stopped
//!                |
//!                +-> Restarting -> Starting
//! ```
//!
//! Starting builds fresh state from the configuration and the options file
//! and binds the server. Running polls the command mailbox. Restarting tears
//! the server down and marks the process as restarting so the next start
//! does not open another browser tab. Plugin code is not reloaded in
//! process; reloading code is left to the process supervisor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use webui_core::options::{AutoLaunchBrowser, Options};

use crate::app;
use crate::call_queue::GenerationQueue;
use crate::config::{ServerConfig, ServerMode};
use crate::error::AppResult;
use crate::state::{AppState, Services};

/// Env var set while the process is on its second or later start.
pub const RESTARTING_ENV: &str = "SD_WEBUI_RESTARTING";

/// How often the Running state checks the mailbox.
pub const COMMAND_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Pause between closing the server and binding again.
pub const RESTART_DELAY: Duration = Duration::from_millis(500);

/// A command posted to the running server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Stop,
    Restart,
    Unknown(String),
}

impl ServerCommand {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "stop" => Self::Stop,
            "restart" => Self::Restart,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Mailbox the API posts server commands to.
#[derive(Debug)]
pub struct ServerCommands {
    tx: mpsc::UnboundedSender<String>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl Default for ServerCommands {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerCommands {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn request(&self, command: impl Into<String>) {
        let command = command.into();
        tracing::info!(command = %command, "Server command requested");
        // The receiver lives in `self`, so the channel is never closed here.
        let _ = self.tx.send(command);
    }

    /// Next command, or `None` if none arrives within `timeout`.
    pub async fn wait(&self, timeout: Duration) -> Option<String> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }
}

/// Process-wide restart marker kept in the environment.
#[derive(Debug, Clone)]
pub struct RestartMarker {
    key: String,
}

impl Default for RestartMarker {
    fn default() -> Self {
        Self::with_key(RESTARTING_ENV)
    }
}

impl RestartMarker {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn is_restarting(&self) -> bool {
        std::env::var(&self.key).is_ok_and(|v| v == "1")
    }

    /// Set the marker unless something already set the variable.
    pub fn mark(&self) {
        if std::env::var_os(&self.key).is_none() {
            std::env::set_var(&self.key, "1");
        }
    }
}

/// Whether a browser tab should be opened after this start.
///
/// Never on a restart. `Remote` or `--autolaunch` always open one; `Local`
/// only when the server is bound to localhost.
pub fn should_auto_launch(
    setting: AutoLaunchBrowser,
    autolaunch_flag: bool,
    is_non_local: bool,
    restarting: bool,
) -> bool {
    if restarting {
        return false;
    }
    match setting {
        AutoLaunchBrowser::Remote => true,
        _ if autolaunch_flag => true,
        AutoLaunchBrowser::Local => !is_non_local,
        AutoLaunchBrowser::Disable => false,
    }
}

/// The bind/serve seam of the lifecycle.
#[async_trait]
pub trait WebServer: Send {
    /// Bind and start serving `app`. Returns the local URL.
    async fn launch(&mut self, app: Router, config: &ServerConfig) -> AppResult<String>;

    /// Stop serving. Safe to call when nothing is running.
    async fn close(&mut self);

    fn open_browser(&self, url: &str);
}

/// What happened over the lifetime of the loop.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LifecycleReport {
    /// One entry per start: whether a browser was opened.
    pub auto_launched: Vec<bool>,
}

impl LifecycleReport {
    pub fn starts(&self) -> usize {
        self.auto_launched.len()
    }
}

pub struct ServerLifecycle<S> {
    config: Arc<ServerConfig>,
    services: Services,
    server: S,
    marker: RestartMarker,
    interrupt: CancellationToken,
    poll_interval: Duration,
    restart_delay: Duration,
    queue: Option<Arc<GenerationQueue>>,
}

impl<S: WebServer> ServerLifecycle<S> {
    pub fn new(config: Arc<ServerConfig>, services: Services, server: S) -> Self {
        Self {
            config,
            services,
            server,
            marker: RestartMarker::default(),
            interrupt: CancellationToken::new(),
            poll_interval: COMMAND_POLL_INTERVAL,
            restart_delay: RESTART_DELAY,
            queue: None,
        }
    }

    pub fn with_marker(mut self, marker: RestartMarker) -> Self {
        self.marker = marker;
        self
    }

    /// Cancelling `token` is treated as a `stop` command.
    pub fn with_interrupt(mut self, token: CancellationToken) -> Self {
        self.interrupt = token;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Run until a `stop` command or an interrupt.
    pub async fn run(mut self) -> AppResult<LifecycleReport> {
        let mut report = LifecycleReport::default();
        loop {
            let auto_launched = self.start().await?;
            report.auto_launched.push(auto_launched);

            match self.wait_for_command().await {
                ServerCommand::Restart => self.restart().await,
                _ => {
                    self.shutdown().await;
                    tracing::info!("Server stopped");
                    return Ok(report);
                }
            }
        }
    }

    /// Starting: returns whether a browser was opened.
    async fn start(&mut self) -> AppResult<bool> {
        let timer = Arc::clone(&self.services.timer);

        // Options are re-read on every start, so a restart picks up edits.
        let options = Options::load(&self.config.ui_settings_file)?;
        timer.record("load options");

        let state = AppState::build(Arc::clone(&self.config), options.clone(), &self.services);

        if options.clean_temp_dir_at_start {
            if let Err(e) = state.temp_dir.cleanup().await {
                tracing::warn!(error = %e, "Failed to clean UI temp dir");
            }
            timer.record("cleanup temp dir");
        }

        self.services.callbacks.before_ui(&timer);
        timer.record("scripts before_ui_callback");

        let router = app::build_app(state.clone());
        timer.record("create ui");

        let auto_launch = self.config.mode == ServerMode::Ui
            && should_auto_launch(
                options.auto_launch_browser,
                self.config.autolaunch,
                self.config.is_non_local,
                self.marker.is_restarting(),
            );

        if self.config.share {
            tracing::warn!("--share is not supported; serving locally only");
        }

        let url = self.server.launch(router, &self.config).await?;
        timer.record("launch");

        if auto_launch {
            self.server.open_browser(&url);
        }

        self.services.callbacks.app_started(&url, &timer);
        timer.record("app_started_callback");

        self.queue = Some(state.queue);
        tracing::info!(url = %url, startup = %timer.summary(), "Server started");
        Ok(auto_launch)
    }

    /// Running: block until `stop`, `restart` or an interrupt.
    async fn wait_for_command(&self) -> ServerCommand {
        loop {
            let received = tokio::select! {
                () = self.interrupt.cancelled() => {
                    tracing::info!("Interrupted, stopping server");
                    return ServerCommand::Stop;
                }
                received = self.services.commands.wait(self.poll_interval) => received,
            };

            let Some(raw) = received else { continue };
            match ServerCommand::parse(&raw) {
                ServerCommand::Restart if self.config.mode == ServerMode::ApiOnly => {
                    tracing::warn!("Restart is not available in API-only mode; ignoring");
                }
                ServerCommand::Unknown(command) => {
                    tracing::warn!(command = %command, "Unknown server command");
                }
                command => return command,
            }
        }
    }

    /// Restarting: tear down, then mark the process for the next start.
    async fn restart(&mut self) {
        tracing::info!("Restarting server");
        self.shutdown().await;
        tokio::time::sleep(self.restart_delay).await;

        let timer = &self.services.timer;
        timer.reset();
        self.services.callbacks.app_reload(timer);
        self.services.callbacks.script_unloaded(timer);

        self.marker.mark();
    }

    async fn shutdown(&mut self) {
        if let Some(queue) = self.queue.take() {
            queue.close();
        }
        self.server.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse() {
        assert_eq!(ServerCommand::parse("stop"), ServerCommand::Stop);
        assert_eq!(ServerCommand::parse(" restart\n"), ServerCommand::Restart);
        assert_eq!(
            ServerCommand::parse("reboot"),
            ServerCommand::Unknown("reboot".to_string())
        );
    }

    #[test]
    fn auto_launch_rules() {
        use AutoLaunchBrowser::*;

        assert!(should_auto_launch(Local, false, false, false));
        assert!(!should_auto_launch(Local, false, true, false));
        assert!(should_auto_launch(Remote, false, true, false));
        assert!(!should_auto_launch(Disable, false, false, false));
        assert!(should_auto_launch(Disable, true, true, false));

        for setting in [Disable, Local, Remote] {
            assert!(!should_auto_launch(setting, true, false, true));
        }
    }

    #[test]
    fn marker_is_set_only_when_absent() {
        let key = format!("WEBUI_TEST_MARKER_{}", uuid::Uuid::new_v4().simple());
        let marker = RestartMarker::with_key(&key);
        assert!(!marker.is_restarting());

        marker.mark();
        assert!(marker.is_restarting());

        let other = format!("WEBUI_TEST_MARKER_{}", uuid::Uuid::new_v4().simple());
        std::env::set_var(&other, "0");
        let preset = RestartMarker::with_key(&other);
        preset.mark();
        assert!(!preset.is_restarting());
    }

    #[tokio::test]
    async fn mailbox_times_out_when_empty() {
        let commands = ServerCommands::new();
        assert_eq!(commands.wait(Duration::from_millis(10)).await, None);

        commands.request("stop");
        assert_eq!(
            commands.wait(Duration::from_millis(10)).await.as_deref(),
            Some("stop")
        );
    }
}
