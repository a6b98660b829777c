use futures::future::BoxFuture;
use image::RgbaImage;

use crate::config::TierShape;

/// Status returned by an engine for a successful call.
pub const STATUS_OK: i32 = 0;

/// External person segmenter (e.g. a pose-segmentation library)
///
/// Works on the downsampled frame and labels every pixel, row-major,
/// as person (non-zero) or background (zero).
pub trait PersonSegmenter {
    fn segment_person<'a>(
        &'a mut self,
        frame: &'a RgbaImage,
    ) -> BoxFuture<'a, anyhow::Result<Vec<u8>>>;
}

/// Raw-buffer inference engine
///
/// The engine exposes one float memory with an input region (interleaved
/// RGB in [0, 1] at segmentation resolution) and an output region
/// (`channels` floats per pixel). Offsets are in `f32` elements.
/// Calls report a status code where [`STATUS_OK`] means success.
pub trait InferenceEngine {
    /// File extension of the models this engine understands
    fn model_extension(&self) -> &'static str;

    /// Scratch area the serialized model is copied into before `load_model`.
    fn model_buffer(&mut self, byte_length: usize) -> &mut [u8];

    /// Parses the first `byte_length` bytes of the model buffer.
    ///
    /// On failure the previously loaded model stays usable.
    fn load_model(&mut self, byte_length: usize) -> i32;

    /// Sizes the input/output regions for a segmentation tier.
    fn configure_io(&mut self, shape: TierShape);

    fn input_memory_offset(&self) -> usize;

    fn output_memory_offset(&self) -> usize;

    fn memory(&self) -> &[f32];

    fn memory_mut(&mut self) -> &mut [f32];

    /// Runs the loaded model over the input region, blocking until done.
    fn run_inference(&mut self) -> i32;
}
