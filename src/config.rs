use std::fmt;
use std::sync::{Arc, OnceLock};

use clap::ValueEnum;
use image::RgbaImage;

use crate::error::{BackdropError, Result};

/// Background shown behind the person.
#[derive(Debug, Clone, Default)]
pub enum BackgroundConfig {
    #[default]
    None,
    Blur,
    Image(BackgroundImage),
}

impl BackgroundConfig {
    pub fn kind(&self) -> BackgroundKind {
        match self {
            BackgroundConfig::None => BackgroundKind::None,
            BackgroundConfig::Blur => BackgroundKind::Blur,
            BackgroundConfig::Image(_) => BackgroundKind::Image,
        }
    }

    pub fn image(&self) -> Option<&BackgroundImage> {
        match self {
            BackgroundConfig::Image(image) => Some(image),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackgroundKind {
    None,
    Blur,
    Image,
}

/// A background picture that may still be decoding.
///
/// The caller owns decoding and fills the slot once pixels are ready;
/// pipelines only read it and treat an empty slot as "not loaded yet".
#[derive(Debug, Clone)]
pub struct BackgroundImage {
    pub url: String,
    decoded: Arc<OnceLock<RgbaImage>>,
}

impl BackgroundImage {
    pub fn pending(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            decoded: Arc::new(OnceLock::new()),
        }
    }

    pub fn loaded(url: impl Into<String>, image: RgbaImage) -> Self {
        let background = Self::pending(url);
        background.finish_decoding(image);
        background
    }

    /// Publishes decoded pixels. Later calls are ignored.
    pub fn finish_decoding(&self, image: RgbaImage) {
        let _ = self.decoded.set(image);
    }

    /// Decoded pixels, once the image has a non-zero height.
    pub fn pixels(&self) -> Option<&RgbaImage> {
        self.decoded.get().filter(|image| image.height() > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SegmentationModel {
    /// Caller-supplied person segmenter producing binary labels
    Segmenter,
    /// Raw-buffer inference engine producing logits or probabilities
    Meet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum ExecutionTarget {
    Cpu,
    Cuda,
    #[value(name = "tensorrt")]
    TensorRt,
}

impl fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionTarget::Cpu => "cpu",
            ExecutionTarget::Cuda => "cuda",
            ExecutionTarget::TensorRt => "tensorrt",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PipelineKind {
    /// CPU raster compositing
    Raster,
    /// wgpu shader compositing
    Shader,
}

/// Named segmentation resolution tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum InputResolution {
    #[value(name = "360p")]
    P360,
    #[value(name = "144hd")]
    Hd144,
    #[value(name = "144v3")]
    V3_144,
    #[value(name = "96v3")]
    V3_96,
    #[value(name = "144v2")]
    V2_144,
    #[value(name = "96v2")]
    V2_96,
}

/// Segmentation tensor geometry for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierShape {
    pub width: u32,
    pub height: u32,
    /// 1 = person probability, 2 = background/person logits, 0 = no raw output
    pub channels: usize,
}

impl TierShape {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl InputResolution {
    pub fn shape(self) -> TierShape {
        let (width, height, channels) = match self {
            InputResolution::P360 => (640, 360, 0),
            InputResolution::Hd144 => (256, 144, 1),
            InputResolution::V3_144 => (256, 144, 1),
            InputResolution::V3_96 => (160, 96, 1),
            InputResolution::V2_144 => (256, 144, 2),
            InputResolution::V2_96 => (160, 96, 2),
        };
        TierShape {
            width,
            height,
            channels,
        }
    }

    /// Stem of the model file for this tier, if the tier has a model.
    pub fn model_stem(self) -> Option<&'static str> {
        match self {
            InputResolution::P360 => None,
            InputResolution::Hd144 => Some("segm_hd_gpu_v1093"),
            InputResolution::V3_144 => Some("segm_full_sparse_v1008"),
            InputResolution::V3_96 => Some("segm_lite_v1082"),
            InputResolution::V2_144 => Some("segm_full_v679"),
            InputResolution::V2_96 => Some("segm_lite_v681"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentationConfig {
    pub model: SegmentationModel,
    pub backend: ExecutionTarget,
    pub input_resolution: InputResolution,
    pub pipeline: PipelineKind,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            model: SegmentationModel::Meet,
            backend: ExecutionTarget::Cpu,
            input_resolution: InputResolution::V2_96,
            pipeline: PipelineKind::Raster,
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<()> {
        let shape = self.input_resolution.shape();
        match self.model {
            SegmentationModel::Meet if shape.channels == 0 => Err(BackdropError::invalid_config(
                format!("tier {:?} has no inference model", self.input_resolution),
            )),
            SegmentationModel::Segmenter if self.pipeline == PipelineKind::Shader => {
                Err(BackdropError::UnsupportedCombination(
                    "the external segmenter only runs on the raster pipeline".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BlendMode {
    #[default]
    Screen,
    LinearDodge,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointBilateralFilterConfig {
    pub sigma_space: f32,
    pub sigma_color: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessingConfig {
    pub smooth_mask: bool,
    pub use_image_layer: bool,
    pub joint_bilateral_filter: JointBilateralFilterConfig,
    pub coverage: [f32; 2],
    pub light_wrapping: f32,
    pub blend_mode: BlendMode,
}

impl Default for PostProcessingConfig {
    fn default() -> Self {
        Self {
            smooth_mask: true,
            use_image_layer: false,
            joint_bilateral_filter: JointBilateralFilterConfig {
                sigma_space: 1.0,
                sigma_color: 0.1,
            },
            coverage: [0.5, 0.75],
            light_wrapping: 0.3,
            blend_mode: BlendMode::Screen,
        }
    }
}

impl PostProcessingConfig {
    /// Spatial sigma used by default on each pipeline.
    ///
    /// The raster path runs its blur at frame density while the shader
    /// samples the bilateral window sparsely, so they differ.
    pub fn default_sigma_space(pipeline: PipelineKind) -> f32 {
        match pipeline {
            PipelineKind::Raster => 4.0,
            PipelineKind::Shader => 1.0,
        }
    }

    pub fn for_pipeline(pipeline: PipelineKind) -> Self {
        let mut config = Self::default();
        config.joint_bilateral_filter.sigma_space = Self::default_sigma_space(pipeline);
        config
    }

    pub fn validate(&self) -> Result<()> {
        let [low, high] = self.coverage;
        if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) {
            return Err(BackdropError::invalid_config(format!(
                "coverage bounds must lie in [0, 1], got [{low}, {high}]"
            )));
        }
        if low > high {
            return Err(BackdropError::invalid_config(format!(
                "coverage low {low} exceeds high {high}"
            )));
        }
        if !(0.0..=1.0).contains(&self.light_wrapping) {
            return Err(BackdropError::invalid_config(format!(
                "light wrapping must lie in [0, 1], got {}",
                self.light_wrapping
            )));
        }
        let jbf = self.joint_bilateral_filter;
        if !(jbf.sigma_space > 0.0) || !(jbf.sigma_color > 0.0) {
            return Err(BackdropError::invalid_config(
                "bilateral sigmas must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_match_model_geometry() {
        let shape = InputResolution::V2_96.shape();
        assert_eq!((shape.width, shape.height, shape.channels), (160, 96, 2));
        assert_eq!(InputResolution::V3_144.shape().channels, 1);
        assert_eq!(InputResolution::P360.model_stem(), None);
        assert_eq!(InputResolution::Hd144.model_stem(), Some("segm_hd_gpu_v1093"));
    }

    #[test]
    fn sigma_space_default_depends_on_pipeline() {
        let raster = PostProcessingConfig::for_pipeline(PipelineKind::Raster);
        let shader = PostProcessingConfig::for_pipeline(PipelineKind::Shader);
        assert_eq!(raster.joint_bilateral_filter.sigma_space, 4.0);
        assert_eq!(shader.joint_bilateral_filter.sigma_space, 1.0);
    }

    #[test]
    fn inverted_coverage_is_rejected() {
        let config = PostProcessingConfig {
            coverage: [0.8, 0.2],
            ..PostProcessingConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BackdropError::InvalidConfig(_))
        ));
        assert!(PostProcessingConfig::default().validate().is_ok());
    }

    #[test]
    fn segmenter_is_raster_only() {
        let config = SegmentationConfig {
            model: SegmentationModel::Segmenter,
            input_resolution: InputResolution::P360,
            pipeline: PipelineKind::Shader,
            ..SegmentationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BackdropError::UnsupportedCombination(_))
        ));
    }

    #[test]
    fn pending_background_has_no_pixels_until_decoded() {
        let background = BackgroundImage::pending("beach.jpg");
        assert!(background.pixels().is_none());

        let shared = background.clone();
        shared.finish_decoding(RgbaImage::new(4, 2));
        assert_eq!(background.pixels().map(|img| img.dimensions()), Some((4, 2)));
    }
}
