//! Extension scripts that may take over a generation.
//!
//! Every registered hook is offered the request in registration order. The
//! first one that returns a result wins and the default engine is skipped;
//! if none does, the engine runs as usual.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use webui_core::processed::GenerationResult;
use webui_core::request::GenerationRequest;

use crate::error::PipelineError;

/// A txt2img extension hook.
#[async_trait]
pub trait ScriptHook: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Handle the request completely, or return `Ok(None)` to pass.
    async fn try_handle(
        &self,
        request: &mut GenerationRequest,
        args: &[Value],
    ) -> Result<Option<GenerationResult>, PipelineError>;
}

/// Ordered set of registered hooks.
#[derive(Default, Clone)]
pub struct ScriptRunner {
    hooks: Vec<Arc<dyn ScriptHook>>,
}

impl ScriptRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn ScriptHook>) {
        tracing::info!(script = hook.name(), "Registered txt2img script");
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Offer the request to each hook in turn.
    pub async fn run(
        &self,
        request: &mut GenerationRequest,
    ) -> Result<Option<GenerationResult>, PipelineError> {
        let args = request.script_args.clone();
        for hook in &self.hooks {
            if let Some(result) = hook.try_handle(request, &args).await? {
                tracing::debug!(script = hook.name(), id_task = %request.id_task, "Script handled generation");
                return Ok(Some(result));
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for ScriptRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| h.name().to_string()))
            .finish()
    }
}
