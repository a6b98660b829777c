use super::FrameSource;
use anyhow::{Context, Result};
use image::RgbaImage;
use std::path::Path;

/// Yields the same decoded picture every frame.
pub struct StillImageSource {
    frame: RgbaImage,
}

impl StillImageSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let frame = image::open(path)
            .with_context(|| format!("Failed to decode source image {}", path.display()))?
            .to_rgba8();
        tracing::info!(
            "Still image source {} ({}x{})",
            path.display(),
            frame.width(),
            frame.height()
        );
        Ok(Self::from_image(frame))
    }

    pub fn from_image(frame: RgbaImage) -> Self {
        Self { frame }
    }
}

impl FrameSource for StillImageSource {
    fn next_frame(&mut self) -> Result<RgbaImage> {
        Ok(self.frame.clone())
    }

    fn resolution(&self) -> (u32, u32) {
        self.frame.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_identical_frames() {
        let image = RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 255]));
        let mut source = StillImageSource::from_image(image.clone());
        assert_eq!(source.resolution(), (3, 2));
        assert_eq!(source.next_frame().unwrap(), image);
        assert_eq!(source.next_frame().unwrap(), image);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = StillImageSource::open("/nonexistent/backdrop/source.png").err().unwrap();
        assert!(format!("{err:#}").contains("source.png"));
    }
}
