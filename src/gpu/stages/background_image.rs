use bytemuck::{Pod, Zeroable};

use crate::compose::ImageCompositeParams;
use crate::config::{BackgroundImage, BlendMode};
use crate::gpu::context::{GpuContext, GpuTexture};
use crate::gpu::quad::{layout, Quad};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
struct ImageUniforms {
    coverage: [f32; 2],
    light_wrapping: f32,
    blend_mode: u32,
    background_scale: [f32; 2],
    background_offset: [f32; 2],
}

const IDENTITY_FIT: ([f32; 2], [f32; 2]) = ([1.0, 1.0], [0.0, 0.0]);

/// Scale and offset of background uvs so the image covers the frame
/// without distortion, cropping the overflowing axis around its center.
pub fn cover_fit(frame: (u32, u32), background: (u32, u32)) -> ([f32; 2], [f32; 2]) {
    let frame_ratio = frame.0 as f32 / frame.1 as f32;
    let background_ratio = background.0 as f32 / background.1 as f32;
    if background_ratio > frame_ratio {
        let scale = frame_ratio / background_ratio;
        ([scale, 1.0], [(1.0 - scale) / 2.0, 0.0])
    } else {
        let scale = background_ratio / frame_ratio;
        ([1.0, scale], [0.0, (1.0 - scale) / 2.0])
    }
}

/// Composites the frame over a still image using the upsampled mask.
///
/// Also serves frames without a background: the caller pins coverage
/// and disables light wrapping, and the placeholder texture stays bound.
pub struct BackgroundImageStage {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    uniforms: wgpu::Buffer,
    background: GpuTexture,
    image: Option<BackgroundImage>,
    /// Whether `background` shows `image`, or the placeholder when there is none.
    uploaded: bool,
    frame_size: (u32, u32),
    params: ImageCompositeParams,
    fit: ([f32; 2], [f32; 2]),
}

impl BackgroundImageStage {
    pub fn new(
        context: &GpuContext,
        quad: &Quad,
        input_frame: &GpuTexture,
        person_mask: &GpuTexture,
        image: Option<BackgroundImage>,
        params: ImageCompositeParams,
    ) -> Self {
        let device = context.device();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("background_image_bgl"),
            entries: &[
                layout::texture(0, true),
                layout::texture(1, true),
                layout::texture(2, true),
                layout::sampler(3),
                layout::uniform(4),
            ],
        });
        let pipeline = quad.pipeline(
            context,
            "background_image",
            include_str!("../shaders/background_image.wgsl"),
            &bind_group_layout,
        );

        let background = placeholder(context);
        let frame_size = (input_frame.width, input_frame.height);
        let fit = IDENTITY_FIT;
        let uniforms = context.create_uniform_buffer(
            "background_image_uniforms",
            bytemuck::bytes_of(&uniforms_for(&params, fit)),
        );
        let bind_group = create_bind_group(
            device,
            &bind_group_layout,
            quad,
            input_frame,
            &background,
            person_mask,
            &uniforms,
        );

        Self {
            pipeline,
            bind_group_layout,
            bind_group,
            uniforms,
            background,
            uploaded: image.is_none(),
            image,
            frame_size,
            params,
            fit,
        }
    }

    /// Rewrites the numeric uniforms in place.
    pub fn update(&mut self, context: &GpuContext, params: ImageCompositeParams) {
        self.params = params;
        self.write_uniforms(context);
    }

    /// Swaps the background picture without rebuilding the stage.
    ///
    /// The texture is replaced on the next frame whose image has pixels.
    /// Clearing the image puts the placeholder back on the next frame.
    pub fn set_image(&mut self, image: Option<BackgroundImage>) {
        self.uploaded = image.is_none() && self.image.is_none();
        self.image = image;
    }

    fn write_uniforms(&self, context: &GpuContext) {
        context.queue().write_buffer(
            &self.uniforms,
            0,
            bytemuck::bytes_of(&uniforms_for(&self.params, self.fit)),
        );
    }

    /// Uploads the background once decoding has finished. Until then the
    /// previous texture stays bound. Without an image the placeholder is
    /// bound with an identity fit.
    fn sync_background(
        &mut self,
        context: &GpuContext,
        quad: &Quad,
        input_frame: &GpuTexture,
        person_mask: &GpuTexture,
    ) {
        if self.uploaded {
            return;
        }
        let (texture, fit) = match &self.image {
            None => {
                tracing::debug!("Background cleared, binding placeholder");
                (placeholder(context), IDENTITY_FIT)
            }
            Some(image) => {
                let Some(pixels) = image.pixels() else {
                    tracing::debug!("Background {} not decoded yet", image.url);
                    return;
                };
                let (width, height) = pixels.dimensions();
                let texture = context.create_texture(
                    "background_image",
                    width,
                    height,
                    wgpu::TextureFormat::Rgba8Unorm,
                    wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                );
                context.write_rgba(&texture, pixels.as_raw());
                tracing::debug!("Uploaded background {} ({}x{})", image.url, width, height);
                (texture, cover_fit(self.frame_size, (width, height)))
            }
        };

        let previous = std::mem::replace(&mut self.background, texture);
        context.release_texture(previous);
        self.fit = fit;
        self.bind_group = create_bind_group(
            context.device(),
            &self.bind_group_layout,
            quad,
            input_frame,
            &self.background,
            person_mask,
            &self.uniforms,
        );
        self.write_uniforms(context);
        self.uploaded = true;
    }

    pub fn encode(
        &mut self,
        context: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        quad: &Quad,
        input_frame: &GpuTexture,
        person_mask: &GpuTexture,
        output: &GpuTexture,
    ) {
        self.sync_background(context, quad, input_frame, person_mask);
        quad.draw(
            encoder,
            "background_image_pass",
            &self.pipeline,
            &self.bind_group,
            &output.view,
        );
    }

    pub fn release(self, context: &GpuContext) {
        context.release_buffer(self.uniforms);
        context.release_texture(self.background);
    }
}

fn uniforms_for(params: &ImageCompositeParams, fit: ([f32; 2], [f32; 2])) -> ImageUniforms {
    ImageUniforms {
        coverage: params.coverage,
        light_wrapping: params.light_wrapping,
        blend_mode: match params.blend_mode {
            BlendMode::Screen => 0,
            BlendMode::LinearDodge => 1,
        },
        background_scale: fit.0,
        background_offset: fit.1,
    }
}

/// Opaque black 1x1 texture bound until a background is available.
fn placeholder(context: &GpuContext) -> GpuTexture {
    let texture = context.create_texture(
        "background_placeholder",
        1,
        1,
        wgpu::TextureFormat::Rgba8Unorm,
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
    );
    context.write_rgba(&texture, &[0, 0, 0, 255]);
    texture
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    quad: &Quad,
    input_frame: &GpuTexture,
    background: &GpuTexture,
    person_mask: &GpuTexture,
    uniforms: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("background_image_bg"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&input_frame.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&background.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&person_mask.view),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(&quad.linear_sampler),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: uniforms.as_entire_binding(),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_background_is_cropped_horizontally() {
        let (scale, offset) = cover_fit((1280, 720), (2560, 720));
        assert_eq!(scale[1], 1.0);
        assert!((scale[0] - 0.5).abs() < 1e-6);
        assert!((offset[0] - 0.25).abs() < 1e-6);
        assert_eq!(offset[1], 0.0);
    }

    #[test]
    fn tall_background_is_cropped_vertically() {
        let (scale, offset) = cover_fit((1600, 900), (900, 900));
        assert_eq!(scale[0], 1.0);
        assert!((scale[1] - 0.5625).abs() < 1e-6);
        assert!((offset[1] - 0.21875).abs() < 1e-6);
    }

    #[test]
    fn matching_aspect_is_identity() {
        assert_eq!(cover_fit((640, 360), (1280, 720)), IDENTITY_FIT);
    }

    #[test]
    fn uniform_block_is_32_bytes() {
        assert_eq!(std::mem::size_of::<ImageUniforms>(), 32);
    }
}
