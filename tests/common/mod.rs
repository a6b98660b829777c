#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use backdrop::config::TierShape;
use backdrop::gpu::GpuContext;
use backdrop::segmentation::{EngineRegistry, InferenceEngine, ModelStore, PersonSegmenter};
use backdrop::{ExecutionTarget, InputResolution};
use futures::future::BoxFuture;
use image::{Rgba, RgbaImage};

pub const CORRUPT_MODEL: &[u8] = b"corrupt";

/// Engine that writes constant per-channel values on every run.
///
/// Models whose bytes equal [`CORRUPT_MODEL`] fail to load.
pub struct FakeEngine {
    model: Vec<u8>,
    shape: Option<TierShape>,
    memory: Vec<f32>,
    output: Vec<f32>,
    run_status: i32,
}

impl FakeEngine {
    pub fn new(output: Vec<f32>) -> Self {
        Self {
            model: Vec::new(),
            shape: None,
            memory: Vec::new(),
            output,
            run_status: 0,
        }
    }

    pub fn failing_runs(status: i32) -> Self {
        Self {
            run_status: status,
            ..Self::new(vec![0.0])
        }
    }
}

impl InferenceEngine for FakeEngine {
    fn model_extension(&self) -> &'static str {
        "fake"
    }

    fn model_buffer(&mut self, byte_length: usize) -> &mut [u8] {
        self.model.resize(byte_length, 0);
        &mut self.model[..byte_length]
    }

    fn load_model(&mut self, byte_length: usize) -> i32 {
        if &self.model[..byte_length] == CORRUPT_MODEL {
            return 7;
        }
        0
    }

    fn configure_io(&mut self, shape: TierShape) {
        self.shape = Some(shape);
        self.memory = vec![0.0; shape.pixel_count() * (3 + shape.channels)];
    }

    fn input_memory_offset(&self) -> usize {
        0
    }

    fn output_memory_offset(&self) -> usize {
        self.shape.map(|s| s.pixel_count() * 3).unwrap_or(0)
    }

    fn memory(&self) -> &[f32] {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut [f32] {
        &mut self.memory
    }

    fn run_inference(&mut self) -> i32 {
        if self.run_status != 0 {
            return self.run_status;
        }
        let offset = self.output_memory_offset();
        let output = self.output.clone();
        for (i, value) in self.memory[offset..].iter_mut().enumerate() {
            *value = output[i % output.len()];
        }
        0
    }
}

/// Segmenter labelling every pixel with the same value.
pub struct FakeSegmenter {
    pub label: u8,
    pub calls: usize,
}

impl PersonSegmenter for FakeSegmenter {
    fn segment_person<'a>(
        &'a mut self,
        frame: &'a RgbaImage,
    ) -> BoxFuture<'a, anyhow::Result<Vec<u8>>> {
        self.calls += 1;
        let labels = vec![self.label; frame.width() as usize * frame.height() as usize];
        Box::pin(async move { Ok(labels) })
    }
}

/// Temporary model directory with a fake model for every tier.
pub struct ModelDir {
    pub path: PathBuf,
}

impl ModelDir {
    pub fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("backdrop-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&path).unwrap();
        for tier in [
            InputResolution::Hd144,
            InputResolution::V3_144,
            InputResolution::V3_96,
            InputResolution::V2_144,
            InputResolution::V2_96,
        ] {
            let stem = tier.model_stem().unwrap();
            std::fs::write(path.join(format!("{stem}.fake")), b"model").unwrap();
        }
        Self { path }
    }

    pub fn corrupt(&self, tier: InputResolution) {
        let stem = tier.model_stem().unwrap();
        std::fs::write(self.path.join(format!("{stem}.fake")), CORRUPT_MODEL).unwrap();
    }

    pub fn remove(&self, tier: InputResolution) {
        let stem = tier.model_stem().unwrap();
        std::fs::remove_file(self.path.join(format!("{stem}.fake"))).unwrap();
    }

    pub fn store(&self) -> ModelStore {
        ModelStore::new(&self.path)
    }
}

impl Drop for ModelDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

pub fn cpu_registry(engine: FakeEngine) -> EngineRegistry {
    let mut registry = EngineRegistry::new();
    registry.register(ExecutionTarget::Cpu, Box::new(engine));
    registry
}

/// Opaque gradient so every pixel differs from its neighbours.
pub fn gradient_frame(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) * 7 % 256) as u8,
            255,
        ])
    })
}

/// Shared GPU context, or `None` (with a note) on machines without an adapter.
pub fn gpu() -> Option<Arc<GpuContext>> {
    match GpuContext::new() {
        Ok(context) => Some(Arc::new(context)),
        Err(e) => {
            eprintln!("skipping gpu test: {e}");
            None
        }
    }
}
