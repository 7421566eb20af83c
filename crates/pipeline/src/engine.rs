//! The seam between orchestration and the diffusion engine.

use async_trait::async_trait;
use webui_core::processed::GenerationResult;
use webui_core::progress::ProgressTracker;
use webui_core::request::GenerationRequest;

use crate::error::PipelineError;

/// Runs a fully populated request to completion.
///
/// Implementations may register release callbacks on
/// `request.resources`; the caller closes the request afterwards whether the
/// call succeeded or not. Progress is reported through `progress`.
#[async_trait]
pub trait ProcessingEngine: Send + Sync {
    async fn process_images(
        &self,
        request: &mut GenerationRequest,
        progress: &ProgressTracker,
    ) -> Result<GenerationResult, PipelineError>;
}

/// Stand-in used when the server runs without an engine URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredEngine;

#[async_trait]
impl ProcessingEngine for UnconfiguredEngine {
    async fn process_images(
        &self,
        _request: &mut GenerationRequest,
        _progress: &ProgressTracker,
    ) -> Result<GenerationResult, PipelineError> {
        Err(PipelineError::EngineUnavailable)
    }
}
