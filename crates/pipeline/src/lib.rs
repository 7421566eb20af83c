//! Generation orchestration: script hooks, the engine seam and the txt2img
//! entry points consumed by the HTTP layer.

pub mod engine;
pub mod error;
pub mod remote;
pub mod scripts;
pub mod txt2img;

pub use engine::ProcessingEngine;
pub use error::PipelineError;
pub use scripts::{ScriptHook, ScriptRunner};
pub use txt2img::{Txt2Img, Txt2ImgOutput, UpscaleSelection};
