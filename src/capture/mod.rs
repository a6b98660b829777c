mod still;
#[cfg(feature = "camera")]
mod v4l_capture;

pub use still::StillImageSource;
#[cfg(feature = "camera")]
pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use image::RgbaImage;

/// Pull-based source of video frames with a fixed resolution.
pub trait FrameSource {
    /// Current frame
    fn next_frame(&mut self) -> Result<RgbaImage>;

    /// Resolution of every frame this source yields
    fn resolution(&self) -> (u32, u32);
}
