mod adapter;
mod loader;
#[cfg(feature = "onnx")]
mod onnx;
mod preprocess;
pub mod types;

pub use adapter::{mask_from_output, stable_softmax, RawBufferAdapter, SegmentationBackend};
pub use loader::{EngineRegistry, ModelStore};
#[cfg(feature = "onnx")]
pub use onnx::OnnxEngine;
pub use preprocess::{downsample, write_rgb_input};
pub use types::{InferenceEngine, PersonSegmenter, STATUS_OK};

#[cfg(feature = "onnx")]
use crate::config::ExecutionTarget;

/// Initializes an engine for every target that can run on this machine.
///
/// Targets whose runtime fails to come up are skipped; selecting them
/// later reports them as unavailable.
#[cfg(feature = "onnx")]
pub fn create_default_registry(targets: &[ExecutionTarget]) -> EngineRegistry {
    let mut registry = EngineRegistry::new();
    for &target in targets {
        match OnnxEngine::new(target) {
            Ok(engine) => registry.register(target, Box::new(engine)),
            Err(e) => tracing::warn!("Skipping {} engine: {}", target, e),
        }
    }
    registry
}
