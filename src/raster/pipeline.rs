use image::RgbaImage;

use super::canvas::{Canvas, CompositeOperation, Filter};
use crate::config::{BackgroundConfig, BackgroundKind, PostProcessingConfig, SegmentationConfig};
use crate::error::{BackdropError, Result};
use crate::segmentation::{downsample, SegmentationBackend};
use crate::timing::{FrameEvent, FrameTimer};

/// Mask pre-blur applied when `smooth_mask` is on.
fn mask_blur_sigma(background: BackgroundKind) -> Option<f32> {
    match background {
        BackgroundKind::Blur => Some(8.0),
        BackgroundKind::Image => Some(4.0),
        BackgroundKind::None => None,
    }
}

/// Approximates a blur of `frame` behind the current content by stacking
/// offset copies at doubling distances.
///
/// Used when the canvas cannot filter. Copies at offset `r` get opacity
/// `r / (2 * sigma)`; the loop stops once `r` exceeds `2 * sigma` and the
/// unshifted frame is drawn last at full opacity.
pub fn draw_fallback_blur(canvas: &mut Canvas<'_>, frame: &RgbaImage, sigma: f32) {
    let mut r = 2;
    loop {
        canvas.set_global_alpha(r as f32 / 2.0 / sigma);
        canvas.draw_image(frame, r, -r);
        canvas.draw_image(frame, -r, -r);
        r *= 2;
        if r as f32 > sigma * 2.0 {
            break;
        }
    }
    canvas.set_global_alpha(1.0);
    canvas.draw_image(frame, 0, 0);
}

/// Raster compositing pipeline.
///
/// Each cycle downsamples the frame, runs segmentation into a mask at
/// segmentation resolution and then layers mask, person and background
/// with canvas composite operations.
pub struct CpuPipeline {
    frame_size: (u32, u32),
    background: BackgroundConfig,
    post_processing: PostProcessingConfig,
    mask: RgbaImage,
    supports_filter: bool,
}

impl CpuPipeline {
    pub fn new(
        frame_size: (u32, u32),
        background: BackgroundConfig,
        segmentation: &SegmentationConfig,
        post_processing: PostProcessingConfig,
        supports_filter: bool,
    ) -> Self {
        let shape = segmentation.input_resolution.shape();
        tracing::info!(
            "Raster pipeline: frame {}x{}, segmentation {}x{}, background {:?}",
            frame_size.0,
            frame_size.1,
            shape.width,
            shape.height,
            background.kind()
        );
        if !supports_filter {
            tracing::warn!("Filtered drawing unavailable, using multi-pass blur fallback");
        }
        Self {
            frame_size,
            background,
            post_processing,
            mask: RgbaImage::new(shape.width, shape.height),
            supports_filter,
        }
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    /// Current mask at segmentation resolution, alpha only.
    pub fn mask(&self) -> &RgbaImage {
        &self.mask
    }

    pub fn update_post_processing_config(&mut self, config: &PostProcessingConfig) {
        self.post_processing = config.clone();
    }

    pub async fn render(
        &mut self,
        frame: &RgbaImage,
        backend: &mut SegmentationBackend<'_>,
        timer: &mut FrameTimer,
        surface: &mut RgbaImage,
    ) -> Result<()> {
        if frame.dimensions() != self.frame_size {
            return Err(BackdropError::ResolutionMismatch {
                expected: self.frame_size,
                actual: frame.dimensions(),
            });
        }
        if surface.dimensions() != self.frame_size {
            *surface = RgbaImage::new(self.frame_size.0, self.frame_size.1);
        }

        let background = self.background.kind();
        if background != BackgroundKind::None {
            let downsampled = {
                let _span = tracing::debug_span!("resize").entered();
                let resized = downsample(frame, self.mask.width(), self.mask.height());
                backend.feed(&resized)?;
                resized
            };
            timer.mark(FrameEvent::Resized);

            backend.infer_into(&downsampled, &mut self.mask).await?;
            timer.mark(FrameEvent::Inferred);
        }

        self.compose(frame, surface);
        Ok(())
    }

    fn compose(&self, frame: &RgbaImage, surface: &mut RgbaImage) {
        let _span = tracing::debug_span!("compose").entered();
        let background = self.background.kind();
        let mut canvas = Canvas::new(surface, self.supports_filter);
        canvas.set_composite_operation(CompositeOperation::Copy);

        if background != BackgroundKind::None {
            if self.post_processing.smooth_mask {
                if let Some(sigma) = mask_blur_sigma(background) {
                    canvas.set_filter(Filter::Blur(sigma));
                }
            }
            canvas.draw_image_stretched(&self.mask);
            canvas.set_composite_operation(CompositeOperation::SourceIn);
        }

        canvas.set_filter(Filter::None);
        canvas.draw_image(frame, 0, 0);

        if background == BackgroundKind::None {
            return;
        }
        canvas.set_composite_operation(CompositeOperation::DestinationOver);
        match &self.background {
            BackgroundConfig::Blur => {
                let sigma = self.post_processing.joint_bilateral_filter.sigma_space;
                if canvas.supports_filter() {
                    canvas.set_filter(Filter::Blur(sigma));
                    canvas.draw_image(frame, 0, 0);
                } else {
                    draw_fallback_blur(&mut canvas, frame, sigma);
                }
            }
            BackgroundConfig::Image(image) => {
                if self.post_processing.use_image_layer {
                    return;
                }
                match image.pixels() {
                    Some(pixels) => canvas.draw_image_stretched(pixels),
                    None => tracing::debug!("Background {} not decoded yet", image.url),
                }
            }
            BackgroundConfig::None => {}
        }
    }

    /// Raster resources are plain heap buffers; dropping releases them.
    pub fn clean_up(self) {
        tracing::info!("Raster pipeline cleaned up");
    }
}
