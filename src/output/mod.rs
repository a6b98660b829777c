#[cfg(feature = "camera")]
mod loopback;
mod snapshot;

#[cfg(feature = "camera")]
pub use loopback::V4L2Output;
pub use snapshot::PngSnapshotSink;

use anyhow::Result;
use image::RgbaImage;

/// Destination for composited frames
pub trait OutputSink {
    /// Pushes one composited frame. Sinks may rescale or drop frames.
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<()>;

    /// Resolution the sink was opened with
    fn resolution(&self) -> (u32, u32);
}
