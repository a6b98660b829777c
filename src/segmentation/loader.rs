use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::types::{InferenceEngine, STATUS_OK};
use crate::config::{ExecutionTarget, InputResolution};
use crate::error::{BackdropError, Result};

/// Resolves segmentation tiers to model files.
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn model_path(&self, tier: InputResolution, extension: &str) -> Option<PathBuf> {
        tier.model_stem()
            .map(|stem| self.root.join(format!("{stem}.{extension}")))
    }

    /// Reads the model bytes for `tier`. Missing files are fatal for the
    /// configuration and are not retried.
    pub fn fetch(&self, tier: InputResolution, extension: &str) -> Result<(PathBuf, Vec<u8>)> {
        let path = self.model_path(tier, extension).ok_or_else(|| {
            BackdropError::invalid_config(format!("tier {tier:?} has no inference model"))
        })?;
        let bytes = std::fs::read(&path).map_err(|source| BackdropError::ModelFetch {
            path: path.clone(),
            source,
        })?;
        Ok((path, bytes))
    }
}

/// Inference engines that were successfully initialized, by target.
#[derive(Default)]
pub struct EngineRegistry {
    engines: HashMap<ExecutionTarget, Box<dyn InferenceEngine>>,
    loaded: HashMap<ExecutionTarget, InputResolution>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: ExecutionTarget, engine: Box<dyn InferenceEngine>) {
        tracing::info!("Inference engine registered for {}", target);
        self.loaded.remove(&target);
        self.engines.insert(target, engine);
    }

    pub fn is_available(&self, target: ExecutionTarget) -> bool {
        self.engines.contains_key(&target)
    }

    pub fn loaded_tier(&self, target: ExecutionTarget) -> Option<InputResolution> {
        self.loaded.get(&target).copied()
    }

    pub fn engine_mut(&mut self, target: ExecutionTarget) -> Result<&mut dyn InferenceEngine> {
        match self.engines.get_mut(&target) {
            Some(engine) => Ok(engine.as_mut()),
            None => Err(BackdropError::BackendUnavailable(target)),
        }
    }

    /// Makes `tier` the active model of the engine for `target`.
    ///
    /// Nothing changes unless the model loads: a fetch error or a
    /// non-zero load status leaves the engine and its memory layout as
    /// they were.
    pub fn activate(
        &mut self,
        target: ExecutionTarget,
        tier: InputResolution,
        store: &ModelStore,
    ) -> Result<()> {
        if self.loaded_tier(target) == Some(tier) {
            return Ok(());
        }
        let engine = self.engine_mut(target)?;
        let (path, bytes) = store.fetch(tier, engine.model_extension())?;
        tracing::info!("Loading model {} ({} bytes)", path.display(), bytes.len());

        engine.model_buffer(bytes.len()).copy_from_slice(&bytes);
        let status = engine.load_model(bytes.len());
        if status != STATUS_OK {
            tracing::warn!("Model {} rejected with status {}", path.display(), status);
            return Err(BackdropError::ModelLoad {
                model: path.display().to_string(),
                status,
            });
        }

        let shape = tier.shape();
        engine.configure_io(shape);
        tracing::debug!(
            "Engine io: input offset {}, output offset {}, {}x{}x{}",
            engine.input_memory_offset(),
            engine.output_memory_offset(),
            shape.width,
            shape.height,
            shape.channels
        );
        self.loaded.insert(target, tier);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_path_follows_tier_stem() {
        let store = ModelStore::new("assets/models");
        assert_eq!(
            store.model_path(InputResolution::V2_144, "onnx"),
            Some(PathBuf::from("assets/models/segm_full_v679.onnx"))
        );
        assert_eq!(store.model_path(InputResolution::P360, "onnx"), None);
    }

    #[test]
    fn missing_model_file_is_a_fetch_error() {
        let store = ModelStore::new("/nonexistent/backdrop-models");
        let err = store.fetch(InputResolution::V2_96, "onnx").unwrap_err();
        assert!(matches!(err, BackdropError::ModelFetch { .. }));
    }

    #[test]
    fn unregistered_target_is_unavailable() {
        let mut registry = EngineRegistry::new();
        let store = ModelStore::new("models");
        let err = registry
            .activate(ExecutionTarget::Cuda, InputResolution::V2_96, &store)
            .unwrap_err();
        assert!(matches!(
            err,
            BackdropError::BackendUnavailable(ExecutionTarget::Cuda)
        ));
    }
}
