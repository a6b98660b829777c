use std::sync::Arc;

use image::RgbaImage;

use super::context::{GpuContext, GpuTexture, Readback};
use super::quad::Quad;
use super::stages::{BackgroundBlurStage, BackgroundImageStage, BilateralStage, ResizeStage, SoftmaxStage};
use crate::compose::ImageCompositeParams;
use crate::config::{
    BackgroundConfig, BackgroundKind, PostProcessingConfig, SegmentationConfig, SegmentationModel,
};
use crate::error::{BackdropError, Result};
use crate::segmentation::SegmentationBackend;
use crate::timing::{FrameEvent, FrameTimer};

enum BackgroundStage {
    Blur(BackgroundBlurStage),
    Image(BackgroundImageStage),
}

/// Shader compositing pipeline.
///
/// Every texture, buffer and stage is sized for one frame resolution and
/// one segmentation tier. Changing either means building a new pipeline.
pub struct GpuPipeline {
    context: Arc<GpuContext>,
    frame_size: (u32, u32),
    segmentation_size: (u32, u32),
    channels: usize,
    background: BackgroundConfig,
    post_processing: PostProcessingConfig,
    quad: Quad,
    input_frame: GpuTexture,
    segmentation_input: GpuTexture,
    raw_output: GpuTexture,
    segmentation_mask: GpuTexture,
    person_mask: GpuTexture,
    output: GpuTexture,
    output_readback: Readback,
    resize: ResizeStage,
    softmax: SoftmaxStage,
    bilateral: BilateralStage,
    background_stage: BackgroundStage,
}

impl GpuPipeline {
    pub fn new(
        context: Arc<GpuContext>,
        frame_size: (u32, u32),
        background: BackgroundConfig,
        segmentation: &SegmentationConfig,
        post_processing: PostProcessingConfig,
    ) -> Result<Self> {
        if segmentation.model != SegmentationModel::Meet {
            return Err(BackdropError::UnsupportedCombination(
                "the shader pipeline needs a raw-buffer inference engine".into(),
            ));
        }
        let shape = segmentation.input_resolution.shape();
        let raw_format = match shape.channels {
            1 => wgpu::TextureFormat::R32Float,
            2 => wgpu::TextureFormat::Rg32Float,
            n => {
                return Err(BackdropError::UnsupportedCombination(format!(
                    "tier {:?} has {n} output channels",
                    segmentation.input_resolution
                )))
            }
        };
        tracing::info!(
            "Shader pipeline: frame {}x{}, segmentation {}x{}x{}, background {:?}",
            frame_size.0,
            frame_size.1,
            shape.width,
            shape.height,
            shape.channels,
            background.kind()
        );

        let ctx = context.as_ref();
        let quad = Quad::new(ctx);
        let (width, height) = frame_size;
        let render = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let rgba = wgpu::TextureFormat::Rgba8Unorm;

        let input_frame = ctx.create_texture(
            "input_frame",
            width,
            height,
            rgba,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        let segmentation_input = ctx.create_texture(
            "segmentation_input",
            shape.width,
            shape.height,
            rgba,
            render | wgpu::TextureUsages::COPY_SRC,
        );
        let raw_output = ctx.create_texture(
            "raw_output",
            shape.width,
            shape.height,
            raw_format,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        let segmentation_mask =
            ctx.create_texture("segmentation_mask", shape.width, shape.height, rgba, render);
        let person_mask = ctx.create_texture("person_mask", width, height, rgba, render);
        let output = ctx.create_texture(
            "output",
            width,
            height,
            rgba,
            render | wgpu::TextureUsages::COPY_SRC,
        );
        let output_readback = Readback::new(ctx, "output_readback", width, height);

        let resize = ResizeStage::new(ctx, &quad, &input_frame, &segmentation_input);
        let softmax = SoftmaxStage::new(ctx, &quad, &raw_output, shape.channels);
        let bilateral = BilateralStage::new(
            ctx,
            &quad,
            &input_frame,
            &segmentation_mask,
            post_processing.joint_bilateral_filter,
        );
        let background_stage = match &background {
            BackgroundConfig::Blur => {
                BackgroundStage::Blur(BackgroundBlurStage::new(ctx, &quad, &input_frame, &person_mask))
            }
            other => BackgroundStage::Image(BackgroundImageStage::new(
                ctx,
                &quad,
                &input_frame,
                &person_mask,
                other.image().cloned(),
                ImageCompositeParams::for_background(other.kind(), &post_processing),
            )),
        };

        Ok(Self {
            context,
            frame_size,
            segmentation_size: (shape.width, shape.height),
            channels: shape.channels,
            background,
            post_processing,
            quad,
            input_frame,
            segmentation_input,
            raw_output,
            segmentation_mask,
            person_mask,
            output,
            output_readback,
            resize,
            softmax,
            bilateral,
            background_stage,
        })
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    /// Updates uniforms only; no texture or buffer is allocated.
    pub fn update_post_processing_config(&mut self, config: &PostProcessingConfig) {
        self.post_processing = config.clone();
        self.bilateral
            .update(&self.context, config.joint_bilateral_filter);
        if let BackgroundStage::Image(stage) = &mut self.background_stage {
            stage.update(
                &self.context,
                ImageCompositeParams::for_background(self.background.kind(), config),
            );
        }
    }

    /// Switches between `image` and `none` in place.
    ///
    /// Anything involving `blur` changes the stage graph and needs a new
    /// pipeline.
    pub fn set_background(&mut self, background: BackgroundConfig) -> Result<()> {
        let BackgroundStage::Image(stage) = &mut self.background_stage else {
            return Err(BackdropError::UnsupportedCombination(
                "the blur background stage cannot be swapped in place".into(),
            ));
        };
        if background.kind() == BackgroundKind::Blur {
            return Err(BackdropError::UnsupportedCombination(
                "switching to blur requires a new pipeline".into(),
            ));
        }
        stage.set_image(background.image().cloned());
        stage.update(
            &self.context,
            ImageCompositeParams::for_background(background.kind(), &self.post_processing),
        );
        self.background = background;
        Ok(())
    }

    pub fn accepts_background(&self, background: &BackgroundConfig) -> bool {
        matches!(self.background_stage, BackgroundStage::Image(_))
            && background.kind() != BackgroundKind::Blur
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
        let adapter = backend.as_raw_buffer().ok_or_else(|| {
            BackdropError::UnsupportedCombination(
                "the shader pipeline needs a raw-buffer inference engine".into(),
            )
        })?;
        let shape = adapter.shape();
        if (shape.width, shape.height) != self.segmentation_size || shape.channels != self.channels {
            return Err(BackdropError::ResolutionMismatch {
                expected: self.segmentation_size,
                actual: (shape.width, shape.height),
            });
        }
        if surface.dimensions() != self.frame_size {
            *surface = RgbaImage::new(self.frame_size.0, self.frame_size.1);
        }

        {
            let _span = tracing::debug_span!("resize").entered();
            self.context.write_rgba(&self.input_frame, frame.as_raw());
            let pixels = self
                .resize
                .run(&self.context, &self.quad, &self.segmentation_input)?;
            adapter.write_input(pixels)?;
        }
        timer.mark(FrameEvent::Resized);

        adapter.run_inference()?;
        timer.mark(FrameEvent::Inferred);

        let _span = tracing::debug_span!("compose").entered();
        self.context.write_texture(
            &self.raw_output,
            bytemuck::cast_slice(adapter.output()?),
            self.segmentation_size.0 * self.channels as u32 * 4,
        );

        let mut encoder = self
            .context
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("compose_encoder"),
            });
        self.softmax
            .encode(&mut encoder, &self.quad, &self.segmentation_mask);
        self.bilateral
            .encode(&mut encoder, &self.quad, &self.person_mask);
        match &mut self.background_stage {
            BackgroundStage::Blur(stage) => stage.encode(&mut encoder, &self.quad, &self.output),
            BackgroundStage::Image(stage) => stage.encode(
                &self.context,
                &mut encoder,
                &self.quad,
                &self.input_frame,
                &self.person_mask,
                &self.output,
            ),
        }
        self.output_readback.encode_copy(&mut encoder, &self.output);
        self.context.queue().submit(Some(encoder.finish()));
        self.output_readback
            .read_into(&self.context, &mut **surface)?;
        Ok(())
    }

    /// Releases every texture and buffer, stages first, then the shared
    /// textures in reverse creation order.
    pub fn clean_up(self) {
        let ctx = self.context.as_ref();
        match self.background_stage {
            BackgroundStage::Blur(stage) => stage.release(ctx),
            BackgroundStage::Image(stage) => stage.release(ctx),
        }
        self.bilateral.release(ctx);
        self.softmax.release(ctx);
        self.resize.release(ctx);

        self.output_readback.release(ctx);
        ctx.release_texture(self.output);
        ctx.release_texture(self.person_mask);
        ctx.release_texture(self.segmentation_mask);
        ctx.release_texture(self.raw_output);
        ctx.release_texture(self.segmentation_input);
        ctx.release_texture(self.input_frame);
        self.quad.release(ctx);

        let counts = ctx.counts();
        tracing::info!(
            "Shader pipeline cleaned up ({} textures, {} buffers still live)",
            counts.live_textures(),
            counts.live_buffers()
        );
    }
}
