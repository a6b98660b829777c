use bytemuck::{Pod, Zeroable};

use crate::compose::BilateralParams;
use crate::config::JointBilateralFilterConfig;
use crate::gpu::context::{GpuContext, GpuTexture};
use crate::gpu::quad::{layout, Quad};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
struct BilateralUniforms {
    texel_size: [f32; 2],
    step: f32,
    radius: f32,
    offset: f32,
    sigma_texel: f32,
    sigma_color: f32,
    _pad: f32,
}

impl From<BilateralParams> for BilateralUniforms {
    fn from(p: BilateralParams) -> Self {
        Self {
            texel_size: p.texel_size,
            step: p.step,
            radius: p.radius,
            offset: p.offset,
            sigma_texel: p.sigma_texel,
            sigma_color: p.sigma_color,
            _pad: 0.0,
        }
    }
}

/// Edge-aware upsampling of the segmentation mask to frame resolution.
pub struct BilateralStage {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    uniforms: wgpu::Buffer,
    frame_size: (u32, u32),
    segmentation_size: (u32, u32),
}

impl BilateralStage {
    pub fn new(
        context: &GpuContext,
        quad: &Quad,
        input_frame: &GpuTexture,
        segmentation_mask: &GpuTexture,
        filter: JointBilateralFilterConfig,
    ) -> Self {
        let device = context.device();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bilateral_bgl"),
            entries: &[
                layout::texture(0, true),
                layout::texture(1, true),
                layout::sampler(2),
                layout::uniform(3),
            ],
        });
        let pipeline = quad.pipeline(
            context,
            "joint_bilateral_filter",
            include_str!("../shaders/bilateral.wgsl"),
            &bind_group_layout,
        );

        let frame_size = (input_frame.width, input_frame.height);
        let segmentation_size = (segmentation_mask.width, segmentation_mask.height);
        let params = BilateralParams::new(
            filter.sigma_space,
            filter.sigma_color,
            frame_size,
            segmentation_size,
        );
        let uniforms = context.create_uniform_buffer(
            "bilateral_uniforms",
            bytemuck::bytes_of(&BilateralUniforms::from(params)),
        );
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bilateral_bg"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&input_frame.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&segmentation_mask.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&quad.nearest_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniforms.as_entire_binding(),
                },
            ],
        });
        Self {
            pipeline,
            bind_group,
            uniforms,
            frame_size,
            segmentation_size,
        }
    }

    /// Rewrites the sigmas in place; no GPU object is recreated.
    pub fn update(&self, context: &GpuContext, filter: JointBilateralFilterConfig) {
        let params = BilateralParams::new(
            filter.sigma_space,
            filter.sigma_color,
            self.frame_size,
            self.segmentation_size,
        );
        context.queue().write_buffer(
            &self.uniforms,
            0,
            bytemuck::bytes_of(&BilateralUniforms::from(params)),
        );
    }

    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, quad: &Quad, person_mask: &GpuTexture) {
        quad.draw(
            encoder,
            "joint_bilateral_filter_pass",
            &self.pipeline,
            &self.bind_group,
            &person_mask.view,
        );
    }

    pub fn release(self, context: &GpuContext) {
        context.release_buffer(self.uniforms);
    }
}
