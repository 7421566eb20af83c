use std::sync::Arc;

use tokio::sync::RwLock;
use webui_core::gallery::AllowedPaths;
use webui_core::options::Options;
use webui_core::progress::ProgressTracker;
use webui_pipeline::engine::UnconfiguredEngine;
use webui_pipeline::remote::HttpEngine;
use webui_pipeline::{ProcessingEngine, ScriptRunner, Txt2Img};

use crate::call_queue::GenerationQueue;
use crate::callbacks::CallbackRegistry;
use crate::config::ServerConfig;
use crate::lifecycle::ServerCommands;
use crate::tasks::TaskRegistry;
use crate::tempdir::UiTempDir;
use crate::timer::StartupTimer;

/// Collaborators that outlive a restart.
#[derive(Clone)]
pub struct Services {
    pub engine: Arc<dyn ProcessingEngine>,
    pub scripts: Arc<ScriptRunner>,
    pub callbacks: Arc<CallbackRegistry>,
    pub commands: Arc<ServerCommands>,
    pub timer: Arc<StartupTimer>,
}

impl Services {
    /// Remote engine when `--engine-url` is set, otherwise an engine that
    /// rejects every generation. No scripts or callbacks are registered.
    pub fn from_config(config: &ServerConfig) -> Self {
        let engine: Arc<dyn ProcessingEngine> = match &config.engine_url {
            Some(url) => {
                tracing::info!(url = %url, "Using remote diffusion engine");
                Arc::new(HttpEngine::new(url.clone()))
            }
            None => {
                tracing::warn!("No --engine-url given; generation requests will fail");
                Arc::new(UnconfiguredEngine)
            }
        };
        Self::with_engine(engine)
    }

    pub fn with_engine(engine: Arc<dyn ProcessingEngine>) -> Self {
        Self {
            engine,
            scripts: Arc::new(ScriptRunner::new()),
            callbacks: Arc::new(CallbackRegistry::new()),
            commands: Arc::new(ServerCommands::new()),
            timer: Arc::new(StartupTimer::new()),
        }
    }
}

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Rebuilt on every (re)start; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Read-only snapshot per request; replaced wholesale on restart.
    pub options: Arc<RwLock<Options>>,
    pub txt2img: Txt2Img,
    pub queue: Arc<GenerationQueue>,
    pub commands: Arc<ServerCommands>,
    pub timer: Arc<StartupTimer>,
    pub temp_dir: UiTempDir,
    /// Roots gallery files and `/file` may be read from.
    pub allowed_paths: AllowedPaths,
}

impl AppState {
    pub fn build(config: Arc<ServerConfig>, options: Options, services: &Services) -> Self {
        let temp_dir = UiTempDir::from_options(&options);

        let allowed_paths = AllowedPaths::new(
            std::iter::once(temp_dir.path().to_path_buf())
                .chain(config.allowed_paths.iter().cloned()),
        );

        let txt2img = Txt2Img::new(
            Arc::clone(&services.engine),
            Arc::clone(&services.scripts),
            Arc::new(ProgressTracker::new()),
        );

        let queue = Arc::new(GenerationQueue::new(
            config.queue_enabled,
            Arc::new(TaskRegistry::new()),
        ));

        Self {
            options: Arc::new(RwLock::new(options)),
            txt2img,
            queue,
            commands: Arc::clone(&services.commands),
            timer: Arc::clone(&services.timer),
            temp_dir,
            allowed_paths,
            config,
        }
    }
}
