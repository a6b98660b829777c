use bytemuck::{Pod, Zeroable};

use crate::gpu::context::{GpuContext, GpuTexture};
use crate::gpu::quad::{layout, Quad};

/// Vertical + horizontal pass pairs run per frame.
const BLUR_ITERATIONS: usize = 3;

/// Blur runs at this fraction of the frame resolution.
const BLUR_SCALE: f32 = 0.5;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct BlurUniforms {
    texel_offset: [f32; 2],
    _pad: [f32; 2],
}

/// Blurs the frame behind the person and mixes it back with the sharp
/// frame by the person mask.
pub struct BackgroundBlurStage {
    blur_pipeline: wgpu::RenderPipeline,
    blend_pipeline: wgpu::RenderPipeline,
    blur_a: GpuTexture,
    blur_b: GpuTexture,
    vertical: wgpu::Buffer,
    horizontal: wgpu::Buffer,
    /// frame -> blur_a, blur_b -> blur_a, blur_a -> blur_b
    first_vertical: wgpu::BindGroup,
    next_vertical: wgpu::BindGroup,
    horizontal_group: wgpu::BindGroup,
    blend_group: wgpu::BindGroup,
}

impl BackgroundBlurStage {
    pub fn new(
        context: &GpuContext,
        quad: &Quad,
        input_frame: &GpuTexture,
        person_mask: &GpuTexture,
    ) -> Self {
        let device = context.device();
        let width = ((input_frame.width as f32 * BLUR_SCALE) as u32).max(1);
        let height = ((input_frame.height as f32 * BLUR_SCALE) as u32).max(1);
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let blur_a = context.create_texture("blur_a", width, height, wgpu::TextureFormat::Rgba8Unorm, usage);
        let blur_b = context.create_texture("blur_b", width, height, wgpu::TextureFormat::Rgba8Unorm, usage);

        let vertical = context.create_uniform_buffer(
            "blur_vertical",
            bytemuck::bytes_of(&BlurUniforms {
                texel_offset: [0.0, 1.0 / height as f32],
                _pad: [0.0; 2],
            }),
        );
        let horizontal = context.create_uniform_buffer(
            "blur_horizontal",
            bytemuck::bytes_of(&BlurUniforms {
                texel_offset: [1.0 / width as f32, 0.0],
                _pad: [0.0; 2],
            }),
        );

        let blur_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blur_bgl"),
            entries: &[
                layout::texture(0, true),
                layout::texture(1, true),
                layout::sampler(2),
                layout::uniform(3),
            ],
        });
        let blur_pipeline = quad.pipeline(
            context,
            "background_blur",
            include_str!("../shaders/blur.wgsl"),
            &blur_layout,
        );
        let blur_group = |label: &str, source: &GpuTexture, uniforms: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &blur_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&source.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&person_mask.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&quad.linear_sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: uniforms.as_entire_binding(),
                    },
                ],
            })
        };
        let first_vertical = blur_group("blur_first_vertical_bg", input_frame, &vertical);
        let next_vertical = blur_group("blur_next_vertical_bg", &blur_b, &vertical);
        let horizontal_group = blur_group("blur_horizontal_bg", &blur_a, &horizontal);

        let blend_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blur_blend_bgl"),
            entries: &[
                layout::texture(0, true),
                layout::texture(1, true),
                layout::texture(2, true),
                layout::sampler(3),
            ],
        });
        let blend_pipeline = quad.pipeline(
            context,
            "background_blur_blend",
            include_str!("../shaders/blur_blend.wgsl"),
            &blend_layout,
        );
        let blend_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blur_blend_bg"),
            layout: &blend_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&input_frame.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&blur_b.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&person_mask.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&quad.linear_sampler),
                },
            ],
        });

        Self {
            blur_pipeline,
            blend_pipeline,
            blur_a,
            blur_b,
            vertical,
            horizontal,
            first_vertical,
            next_vertical,
            horizontal_group,
            blend_group,
        }
    }

    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, quad: &Quad, output: &GpuTexture) {
        for i in 0..BLUR_ITERATIONS {
            let vertical = if i == 0 {
                &self.first_vertical
            } else {
                &self.next_vertical
            };
            quad.draw(encoder, "blur_vertical_pass", &self.blur_pipeline, vertical, &self.blur_a.view);
            quad.draw(
                encoder,
                "blur_horizontal_pass",
                &self.blur_pipeline,
                &self.horizontal_group,
                &self.blur_b.view,
            );
        }
        quad.draw(
            encoder,
            "blur_blend_pass",
            &self.blend_pipeline,
            &self.blend_group,
            &output.view,
        );
    }

    pub fn release(self, context: &GpuContext) {
        context.release_buffer(self.horizontal);
        context.release_buffer(self.vertical);
        context.release_texture(self.blur_b);
        context.release_texture(self.blur_a);
    }
}
