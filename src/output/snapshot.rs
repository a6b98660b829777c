use super::OutputSink;
use anyhow::{Context, Result};
use image::RgbaImage;
use std::path::{Path, PathBuf};

/// Saves every `interval`-th frame to one PNG file, overwriting it.
pub struct PngSnapshotSink {
    path: PathBuf,
    interval: u64,
    frames_seen: u64,
    resolution: (u32, u32),
}

impl PngSnapshotSink {
    pub fn new<P: AsRef<Path>>(path: P, interval: u64, resolution: (u32, u32)) -> Self {
        let path = path.as_ref().to_path_buf();
        tracing::info!(
            "Writing a snapshot to {} every {} frames",
            path.display(),
            interval.max(1)
        );
        Self {
            path,
            interval: interval.max(1),
            frames_seen: 0,
            resolution,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputSink for PngSnapshotSink {
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<()> {
        let due = self.frames_seen % self.interval == 0;
        self.frames_seen += 1;
        if !due {
            return Ok(());
        }
        frame
            .save_with_format(&self.path, image::ImageFormat::Png)
            .with_context(|| format!("Failed to write snapshot {}", self.path.display()))?;
        tracing::debug!("Snapshot written to {}", self.path.display());
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }
}
