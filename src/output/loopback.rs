use super::OutputSink;
use anyhow::{Context, Result};
use image::{imageops, Rgba, RgbaImage};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

/// Writes frames to a v4l2loopback device as packed YUYV.
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
    packed: Vec<u8>,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let format = Output::set_format(&device, &Format::new(width, height, FourCC::new(b"YUYV")))
            .context("Failed to set YUYV output format")?;
        tracing::debug!("Loopback format: {}", format);

        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        Ok(Self {
            file,
            width,
            height,
            packed: Vec::with_capacity(yuyv_len(width, height)),
        })
    }
}

fn yuyv_len(width: u32, height: u32) -> usize {
    width.div_ceil(2) as usize * 4 * height as usize
}

/// Transparent output has nothing behind it on a webcam, so pixels are
/// flattened onto black first.
fn flatten(pixel: &Rgba<u8>) -> [i32; 3] {
    let a = pixel[3] as i32;
    [0, 1, 2].map(|c| (pixel[c] as i32 * a + 127) / 255)
}

/// BT.601 limited range luma, 8.8 fixed point.
fn luma([r, g, b]: [i32; 3]) -> u8 {
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(16, 235) as u8
}

/// BT.601 limited range chroma of an already averaged pixel pair.
fn chroma([r, g, b]: [i32; 3]) -> (u8, u8) {
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (u.clamp(16, 240) as u8, v.clamp(16, 240) as u8)
}

/// Packs `image` as YUYV 4:2:2 into `out`; odd widths repeat the last pixel.
fn pack_yuyv(image: &RgbaImage, out: &mut Vec<u8>) {
    out.clear();
    for row in image.rows() {
        let pixels: Vec<[i32; 3]> = row.map(flatten).collect();
        for pair in pixels.chunks(2) {
            let first = pair[0];
            let second = pair.get(1).copied().unwrap_or(first);
            let average = [0, 1, 2].map(|c| (first[c] + second[c] + 1) / 2);
            let (u, v) = chroma(average);
            out.extend_from_slice(&[luma(first), u, luma(second), v]);
        }
    }
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<()> {
        if frame.dimensions() == (self.width, self.height) {
            pack_yuyv(frame, &mut self.packed);
        } else {
            let resized = imageops::resize(
                frame,
                self.width,
                self.height,
                imageops::FilterType::Triangle,
            );
            pack_yuyv(&resized, &mut self.packed);
        }

        self.file
            .write_all(&self.packed)
            .context("Failed to write frame to v4l2loopback device")?;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
