//! Real-time person segmentation and background compositing.
//!
//! Frames are segmented by a raw-buffer inference engine or an external
//! person segmenter, then composited over no background, a blurred copy
//! of the frame, or a still image. Compositing runs either on the CPU
//! ([`raster`]) or through wgpu shaders ([`gpu`]); [`PipelineManager`]
//! owns whichever one is active.

pub mod capture;
pub mod compose;
pub mod config;
pub mod error;
pub mod gpu;
pub mod lifecycle;
pub mod output;
pub mod raster;
pub mod segmentation;
pub mod timing;

pub use config::{
    BackgroundConfig, BackgroundImage, BlendMode, ExecutionTarget, InputResolution,
    JointBilateralFilterConfig, PipelineKind, PostProcessingConfig, SegmentationConfig,
    SegmentationModel,
};
pub use error::{BackdropError, Result};
pub use lifecycle::{Pipeline, PipelineManager, PipelineStats};
pub use timing::{FrameEvent, FrameTimer, FrameTimings};
