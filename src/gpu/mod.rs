//! wgpu implementation of the compositing pipeline.
//!
//! Stages share one full-screen quad and talk through textures:
//! resize, softmax, joint bilateral filter, then either the blur or the
//! image background stage.

mod context;
mod pipeline;
mod quad;
mod stages;

pub use context::{GpuContext, GpuTexture, ResourceCounts};
pub use pipeline::GpuPipeline;
pub use stages::cover_fit;
