use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{BackdropError, Result};

/// Allocation counts kept by [`GpuContext`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub textures_created: usize,
    pub textures_released: usize,
    pub buffers_created: usize,
    pub buffers_released: usize,
}

impl ResourceCounts {
    pub fn live_textures(&self) -> usize {
        self.textures_created - self.textures_released
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers_created - self.buffers_released
    }
}

#[derive(Debug, Default)]
struct ResourceLedger {
    textures_created: AtomicUsize,
    textures_released: AtomicUsize,
    buffers_created: AtomicUsize,
    buffers_released: AtomicUsize,
}

/// A texture together with its default view.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

/// Device, queue and the allocation ledger shared by every shader pipeline.
///
/// Textures and buffers must be created and released through this type so
/// that leaks show up in [`GpuContext::counts`].
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    ledger: ResourceLedger,
}

impl GpuContext {
    /// Requests a high performance adapter without a surface.
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                BackdropError::gpu("no gpu adapter available")
            }
            other => BackdropError::gpu(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("backdrop_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| BackdropError::gpu(format!("wgpu request_device failed: {e:?}")))?;

        let adapter_name = adapter.get_info().name;
        tracing::info!("GPU adapter: {}", adapter_name);
        Ok(Self {
            device,
            queue,
            adapter_name,
            ledger: ResourceLedger::default(),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn counts(&self) -> ResourceCounts {
        ResourceCounts {
            textures_created: self.ledger.textures_created.load(Ordering::Relaxed),
            textures_released: self.ledger.textures_released.load(Ordering::Relaxed),
            buffers_created: self.ledger.buffers_created.load(Ordering::Relaxed),
            buffers_released: self.ledger.buffers_released.load(Ordering::Relaxed),
        }
    }

    pub fn create_texture(
        &self,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> GpuTexture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.ledger.textures_created.fetch_add(1, Ordering::Relaxed);
        GpuTexture {
            texture,
            view,
            width,
            height,
        }
    }

    pub fn create_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        self.ledger.buffers_created.fetch_add(1, Ordering::Relaxed);
        buffer
    }

    /// Uniform buffer initialized with `contents`.
    pub fn create_uniform_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        let buffer = self.create_buffer(
            label,
            contents.len() as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        self.queue.write_buffer(&buffer, 0, contents);
        buffer
    }

    pub fn release_texture(&self, texture: GpuTexture) {
        texture.texture.destroy();
        self.ledger.textures_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn release_buffer(&self, buffer: wgpu::Buffer) {
        buffer.destroy();
        self.ledger.buffers_released.fetch_add(1, Ordering::Relaxed);
    }

    /// Uploads tightly packed RGBA8 pixels into `target`.
    pub fn write_rgba(&self, target: &GpuTexture, pixels: &[u8]) {
        self.write_texture(target, pixels, target.width * 4);
    }

    pub fn write_texture(&self, target: &GpuTexture, data: &[u8], bytes_per_row: u32) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(target.height),
            },
            wgpu::Extent3d {
                width: target.width,
                height: target.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Staging buffer for copying an RGBA8 texture back to the CPU.
pub struct Readback {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
}

impl Readback {
    pub fn new(context: &GpuContext, label: &str, width: u32, height: u32) -> Self {
        let padded_bytes_per_row = align_to(width * 4, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let buffer = context.create_buffer(
            label,
            padded_bytes_per_row as u64 * height as u64,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );
        Self {
            buffer,
            width,
            height,
            padded_bytes_per_row,
        }
    }

    /// Records a copy of `source` into the staging buffer.
    pub fn encode_copy(&self, encoder: &mut wgpu::CommandEncoder, source: &GpuTexture) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &source.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Waits for submitted work and copies the unpadded rows into `out`.
    pub fn read_into(&self, context: &GpuContext, out: &mut [u8]) -> Result<()> {
        let row_bytes = self.width as usize * 4;
        if out.len() != row_bytes * self.height as usize {
            return Err(BackdropError::gpu("readback destination has the wrong size"));
        }

        let slice = self.buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        context
            .device()
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| BackdropError::gpu(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| BackdropError::gpu("readback channel closed"))?
            .map_err(|e| BackdropError::gpu(format!("readback map failed: {e:?}")))?;

        {
            let mapped = slice.get_mapped_range();
            let padded = self.padded_bytes_per_row as usize;
            for (row, dst) in out.chunks_exact_mut(row_bytes).enumerate() {
                let start = row * padded;
                dst.copy_from_slice(&mapped[start..start + row_bytes]);
            }
        }
        self.buffer.unmap();
        Ok(())
    }

    pub fn release(self, context: &GpuContext) {
        context.release_buffer(self.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(align_to(160 * 4, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT), 768);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(1, 256), 256);
    }

    #[test]
    fn live_counts_subtract_releases() {
        let counts = ResourceCounts {
            textures_created: 7,
            textures_released: 5,
            buffers_created: 3,
            buffers_released: 3,
        };
        assert_eq!(counts.live_textures(), 2);
        assert_eq!(counts.live_buffers(), 0);
    }
}
