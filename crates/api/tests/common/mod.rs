#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use webui_api::app::build_app;
use webui_api::config::{ServerConfig, ServerMode};
use webui_api::state::{AppState, Services};
use webui_core::images::OutputImage;
use webui_core::options::Options;
use webui_core::processed::GenerationResult;
use webui_core::progress::ProgressTracker;
use webui_core::request::GenerationRequest;
use webui_pipeline::{PipelineError, ProcessingEngine};

/// Build a test `ServerConfig` with safe defaults: UI plus API, server
/// commands enabled, one CORS origin, no auth.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        mode: ServerMode::Ui,
        api: true,
        api_server_stop: true,
        cors_origins: vec!["http://localhost:5173".to_string()],
        cors_origins_regex: None,
        request_timeout_secs: 30,
        queue_enabled: true,
        autolaunch: false,
        is_non_local: false,
        allowed_paths: Vec::new(),
        root_path: String::new(),
        auth: Vec::new(),
        ui_settings_file: PathBuf::from("config.json"),
        engine_url: None,
        share: false,
        debug: false,
    }
}

/// Engine that returns `batch_size * n_iter` 2x2 images.
#[derive(Default)]
pub struct FakeEngine {
    pub calls: AtomicUsize,
}

impl FakeEngine {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessingEngine for FakeEngine {
    async fn process_images(
        &self,
        request: &mut GenerationRequest,
        progress: &ProgressTracker,
    ) -> Result<GenerationResult, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        progress.begin(request.n_iter, request.steps);

        let count = request.expected_images() as usize;
        let images = (0..count).map(|_| image()).collect();
        let infotexts = (0..count)
            .map(|i| {
                format!(
                    "{}\nSteps: {}, Seed: {}, Size: 2x2",
                    request.prompt,
                    request.steps,
                    1000 + i
                )
            })
            .collect();
        Ok(GenerationResult::for_request(request, images, infotexts))
    }
}

/// A 2x2 PNG that is not on disk yet.
pub fn image() -> OutputImage {
    let mut png = Vec::new();
    image::RgbImage::new(2, 2)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    OutputImage::from_bytes(&png).unwrap()
}

/// The application plus handles tests inspect.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub engine: Arc<FakeEngine>,
    /// UI temp dir; removed on drop.
    pub temp: TempDir,
}

/// Build the full application router with all middleware layers, backed by
/// a [`FakeEngine`] and a fresh temp dir.
pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let temp = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::default());
    let options = Options {
        temp_dir: temp.path().to_string_lossy().into_owned(),
        ..Options::default()
    };

    let services = Services::with_engine(engine.clone());
    let state = AppState::build(Arc::new(config), options, &services);

    TestApp {
        router: build_app(state.clone()),
        state,
        engine,
        temp,
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    app.oneshot(
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
