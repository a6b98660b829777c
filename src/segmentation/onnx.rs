use anyhow::{Context, Result};
use ndarray::ArrayView3;
use ort::execution_providers::{self as ep, ExecutionProvider, ExecutionProviderDispatch};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::types::{InferenceEngine, STATUS_OK};
use crate::config::{ExecutionTarget, TierShape};
use crate::error::BackdropError;

const STATUS_LOAD_FAILED: i32 = 1;
const STATUS_NO_MODEL: i32 = 2;
const STATUS_RUN_FAILED: i32 = 3;

/// Segmentation engine backed by ONNX Runtime.
///
/// Models take one NHWC `[1, height, width, 3]` float input and produce
/// `[1, height, width, channels]` person probabilities or logits.
pub struct OnnxEngine {
    target: ExecutionTarget,
    session: Option<Session>,
    model_buffer: Vec<u8>,
    memory: Vec<f32>,
    shape: Option<TierShape>,
}

impl OnnxEngine {
    /// Creates an engine for `target`, failing if its execution provider
    /// is not usable on this machine.
    pub fn new(target: ExecutionTarget) -> crate::error::Result<Self> {
        let available = match target {
            ExecutionTarget::Cpu => true,
            ExecutionTarget::Cuda => ep::CUDAExecutionProvider::default()
                .is_available()
                .unwrap_or(false),
            ExecutionTarget::TensorRt => ep::TensorRTExecutionProvider::default()
                .is_available()
                .unwrap_or(false),
        };
        if !available {
            return Err(BackdropError::BackendUnavailable(target));
        }

        tracing::info!("ONNX Runtime engine initialized for {}", target);
        Ok(Self {
            target,
            session: None,
            model_buffer: Vec::new(),
            memory: Vec::new(),
            shape: None,
        })
    }

    fn providers(&self) -> Vec<ExecutionProviderDispatch> {
        match self.target {
            ExecutionTarget::Cpu => vec![ep::CPUExecutionProvider::default().build()],
            ExecutionTarget::Cuda => {
                vec![ep::CUDAExecutionProvider::default().build().error_on_failure()]
            }
            ExecutionTarget::TensorRt => {
                vec![ep::TensorRTExecutionProvider::default().build().error_on_failure()]
            }
        }
    }

    fn build_session(&self, byte_length: usize) -> Result<Session> {
        let session = Session::builder()
            .context("failed to create ORT session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("failed to set optimization level")?
            .with_execution_providers(self.providers())
            .context("failed to register execution providers")?
            .commit_from_memory(&self.model_buffer[..byte_length])
            .context("failed to parse segmentation model")?;
        Ok(session)
    }

    fn input_len(&self) -> usize {
        self.shape.map(|s| s.pixel_count() * 3).unwrap_or(0)
    }

    fn infer(&mut self) -> Result<()> {
        let shape = self.shape.context("engine io is not configured")?;
        let input_len = self.input_len();
        let session = self.session.as_mut().context("no model loaded")?;
        let (height, width) = (shape.height as usize, shape.width as usize);

        let input = self.memory[..input_len].to_vec();
        let tensor = Tensor::from_array(([1usize, height, width, 3], input.into_boxed_slice()))
            .context("failed to create segmentation input tensor")?;

        let outputs = session
            .run(ort::inputs![tensor])
            .context("segmentation inference failed")?;
        let (_, value) = outputs
            .iter()
            .next()
            .context("segmentation model produced no outputs")?;
        let (_shape, data) = value
            .try_extract_tensor::<f32>()
            .context("failed to extract segmentation output")?;

        let output = ArrayView3::from_shape((height, width, shape.channels), data)
            .context("segmentation output does not match the tier shape")?;
        let region = &mut self.memory[input_len..];
        for (dst, src) in region.iter_mut().zip(output.iter()) {
            *dst = *src;
        }
        Ok(())
    }
}

impl InferenceEngine for OnnxEngine {
    fn model_extension(&self) -> &'static str {
        "onnx"
    }

    fn model_buffer(&mut self, byte_length: usize) -> &mut [u8] {
        self.model_buffer.resize(byte_length, 0);
        &mut self.model_buffer[..byte_length]
    }

    fn load_model(&mut self, byte_length: usize) -> i32 {
        match self.build_session(byte_length) {
            Ok(session) => {
                self.session = Some(session);
                STATUS_OK
            }
            Err(e) => {
                tracing::warn!("ONNX model load failed: {:#}", e);
                STATUS_LOAD_FAILED
            }
        }
    }

    fn configure_io(&mut self, shape: TierShape) {
        self.shape = Some(shape);
        let len = shape.pixel_count() * (3 + shape.channels);
        self.memory.clear();
        self.memory.resize(len, 0.0);
    }

    fn input_memory_offset(&self) -> usize {
        0
    }

    fn output_memory_offset(&self) -> usize {
        self.input_len()
    }

    fn memory(&self) -> &[f32] {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut [f32] {
        &mut self.memory
    }

    fn run_inference(&mut self) -> i32 {
        if self.session.is_none() {
            return STATUS_NO_MODEL;
        }
        match self.infer() {
            Ok(()) => STATUS_OK,
            Err(e) => {
                tracing::warn!("ONNX inference failed: {:#}", e);
                STATUS_RUN_FAILED
            }
        }
    }
}
