use bytemuck::{Pod, Zeroable};

use crate::gpu::context::{GpuContext, GpuTexture};
use crate::gpu::quad::{layout, Quad};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct SoftmaxUniforms {
    channels: u32,
    _pad: [u32; 3],
}

/// Turns the engine's raw output into a mask in the alpha channel.
///
/// Two-channel output is treated as background/person logits; a single
/// channel is already a person probability.
pub struct SoftmaxStage {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    uniforms: wgpu::Buffer,
}

impl SoftmaxStage {
    pub fn new(
        context: &GpuContext,
        quad: &Quad,
        raw_output: &GpuTexture,
        channels: usize,
    ) -> Self {
        let device = context.device();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("softmax_bgl"),
            entries: &[layout::texture(0, false), layout::uniform(1)],
        });
        let pipeline = quad.pipeline(
            context,
            "softmax",
            include_str!("../shaders/softmax.wgsl"),
            &bind_group_layout,
        );
        let uniforms = context.create_uniform_buffer(
            "softmax_uniforms",
            bytemuck::bytes_of(&SoftmaxUniforms {
                channels: channels as u32,
                _pad: [0; 3],
            }),
        );
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("softmax_bg"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&raw_output.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: uniforms.as_entire_binding(),
                },
            ],
        });
        Self {
            pipeline,
            bind_group,
            uniforms,
        }
    }

    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, quad: &Quad, mask: &GpuTexture) {
        quad.draw(encoder, "softmax_pass", &self.pipeline, &self.bind_group, &mask.view);
    }

    pub fn release(self, context: &GpuContext) {
        context.release_buffer(self.uniforms);
    }
}
