use crate::gpu::context::{GpuContext, GpuTexture, Readback};
use crate::gpu::quad::{layout, Quad};

/// Downsamples the input frame to segmentation resolution and stages the
/// result for the inference engine's input memory.
pub struct ResizeStage {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    readback: Readback,
    pixels: Vec<u8>,
}

impl ResizeStage {
    pub fn new(
        context: &GpuContext,
        quad: &Quad,
        input_frame: &GpuTexture,
        output: &GpuTexture,
    ) -> Self {
        let device = context.device();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("resize_bgl"),
            entries: &[layout::texture(0, true), layout::sampler(1)],
        });
        let pipeline = quad.pipeline(
            context,
            "resize",
            include_str!("../shaders/resize.wgsl"),
            &bind_group_layout,
        );
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("resize_bg"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&input_frame.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&quad.linear_sampler),
                },
            ],
        });
        let readback = Readback::new(context, "resize_readback", output.width, output.height);
        Self {
            pipeline,
            bind_group,
            readback,
            pixels: vec![0; output.width as usize * output.height as usize * 4],
        }
    }

    /// Runs the resize pass and returns the downsampled RGBA pixels.
    pub fn run(&mut self, context: &GpuContext, quad: &Quad, output: &GpuTexture) -> crate::error::Result<&[u8]> {
        let mut encoder = context
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("resize_encoder"),
            });
        quad.draw(&mut encoder, "resize_pass", &self.pipeline, &self.bind_group, &output.view);
        self.readback.encode_copy(&mut encoder, output);
        context.queue().submit(Some(encoder.finish()));
        self.readback.read_into(context, &mut self.pixels)?;
        Ok(&self.pixels)
    }

    pub fn release(self, context: &GpuContext) {
        self.readback.release(context);
    }
}
