use image::RgbaImage;

use super::preprocess::{alpha_from_mask, write_rgb_input};
use super::types::{InferenceEngine, PersonSegmenter, STATUS_OK};
use crate::config::TierShape;
use crate::error::{BackdropError, Result};

/// Probability of `person` winning against `background`.
///
/// Both logits are shifted by their maximum before exponentiation so
/// large logits cannot overflow.
pub fn stable_softmax(background: f32, person: f32) -> f32 {
    let shift = background.max(person);
    let background_exp = (background - shift).exp();
    let person_exp = (person - shift).exp();
    person_exp / (background_exp + person_exp)
}

/// View over an inference engine's memory for one segmentation tier.
pub struct RawBufferAdapter<'a> {
    engine: &'a mut dyn InferenceEngine,
    shape: TierShape,
}

impl<'a> RawBufferAdapter<'a> {
    pub fn new(engine: &'a mut dyn InferenceEngine, shape: TierShape) -> Self {
        Self { engine, shape }
    }

    pub fn shape(&self) -> TierShape {
        self.shape
    }

    /// Copies a downsampled RGBA image into the engine's input region.
    pub fn write_input(&mut self, rgba: &[u8]) -> Result<()> {
        let offset = self.engine.input_memory_offset();
        let len = self.shape.pixel_count() * 3;
        let memory = self.engine.memory_mut();
        let available = memory.len();
        let input = memory
            .get_mut(offset..offset + len)
            .ok_or_else(|| region_error("input", offset, len, available))?;
        write_rgb_input(rgba, input);
        Ok(())
    }

    pub fn run_inference(&mut self) -> Result<()> {
        let _span = tracing::debug_span!("inference").entered();
        let status = self.engine.run_inference();
        if status != STATUS_OK {
            return Err(BackdropError::Inference { status });
        }
        Ok(())
    }

    /// Raw output region: `channels` floats per segmentation pixel.
    pub fn output(&self) -> Result<&[f32]> {
        let offset = self.engine.output_memory_offset();
        let len = self.shape.pixel_count() * self.shape.channels;
        let memory = self.engine.memory();
        memory
            .get(offset..offset + len)
            .ok_or_else(|| region_error("output", offset, len, memory.len()))
    }
}

/// The engine memory was laid out for another tier.
fn region_error(region: &str, offset: usize, len: usize, available: usize) -> BackdropError {
    BackdropError::invalid_config(format!(
        "engine {region} region {offset}..{} exceeds its {available} floats of memory",
        offset + len
    ))
}

/// Decodes one pixel of a raw output buffer.
pub fn mask_from_output(output: &[f32], channels: usize, index: usize) -> f32 {
    let pos = index * channels;
    if channels == 1 {
        output[pos]
    } else {
        stable_softmax(output[pos], output[pos + 1])
    }
}

/// Mask source used by a pipeline for one frame.
pub enum SegmentationBackend<'a> {
    Segmenter(&'a mut dyn PersonSegmenter),
    RawBuffer(RawBufferAdapter<'a>),
}

impl<'a> SegmentationBackend<'a> {
    /// Hands the downsampled frame to the engine input, if this backend has one.
    pub fn feed(&mut self, downsampled: &RgbaImage) -> Result<()> {
        match self {
            SegmentationBackend::RawBuffer(adapter) => adapter.write_input(downsampled.as_raw()),
            SegmentationBackend::Segmenter(_) => Ok(()),
        }
    }

    /// Produces the mask for the fed frame into the alpha channel of `mask`.
    ///
    /// The external segmenter is the only suspension point; the raw
    /// buffer variant blocks while the engine runs.
    pub async fn infer_into(&mut self, downsampled: &RgbaImage, mask: &mut RgbaImage) -> Result<()> {
        match self {
            SegmentationBackend::Segmenter(segmenter) => {
                let labels = segmenter
                    .segment_person(downsampled)
                    .await
                    .map_err(BackdropError::Segmenter)?;
                let expected = mask.width() as usize * mask.height() as usize;
                if labels.len() != expected {
                    return Err(BackdropError::Segmenter(anyhow::anyhow!(
                        "segmenter returned {} labels for {} pixels",
                        labels.len(),
                        expected
                    )));
                }
                for (pixel, label) in mask.pixels_mut().zip(labels) {
                    *pixel = alpha_from_mask(if label != 0 { 1.0 } else { 0.0 });
                }
            }
            SegmentationBackend::RawBuffer(adapter) => {
                adapter.run_inference()?;
                let channels = adapter.shape().channels;
                let output = adapter.output()?;
                for (index, pixel) in mask.pixels_mut().enumerate() {
                    *pixel = alpha_from_mask(mask_from_output(output, channels, index));
                }
            }
        }
        Ok(())
    }

    pub fn as_raw_buffer(&mut self) -> Option<&mut RawBufferAdapter<'a>> {
        match self {
            SegmentationBackend::RawBuffer(adapter) => Some(adapter),
            SegmentationBackend::Segmenter(_) => None,
        }
    }
}
