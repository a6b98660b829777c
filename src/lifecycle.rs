use std::sync::Arc;

use image::RgbaImage;

use crate::config::{
    BackgroundConfig, PipelineKind, PostProcessingConfig, SegmentationConfig, SegmentationModel,
};
use crate::error::{BackdropError, Result};
use crate::gpu::{GpuContext, GpuPipeline, ResourceCounts};
use crate::raster::CpuPipeline;
use crate::segmentation::{
    EngineRegistry, ModelStore, PersonSegmenter, RawBufferAdapter, SegmentationBackend,
};
use crate::timing::{FrameTimer, FrameTimings};

/// The active compositing strategy.
pub enum Pipeline {
    Raster(CpuPipeline),
    Shader(GpuPipeline),
}

impl Pipeline {
    pub fn kind(&self) -> PipelineKind {
        match self {
            Pipeline::Raster(_) => PipelineKind::Raster,
            Pipeline::Shader(_) => PipelineKind::Shader,
        }
    }

    pub fn frame_size(&self) -> (u32, u32) {
        match self {
            Pipeline::Raster(p) => p.frame_size(),
            Pipeline::Shader(p) => p.frame_size(),
        }
    }

    /// Runs one cycle and writes the composited frame into `surface`.
    pub async fn render(
        &mut self,
        frame: &RgbaImage,
        backend: &mut SegmentationBackend<'_>,
        timer: &mut FrameTimer,
        surface: &mut RgbaImage,
    ) -> Result<()> {
        match self {
            Pipeline::Raster(p) => p.render(frame, backend, timer, surface).await,
            Pipeline::Shader(p) => p.render(frame, backend, timer, surface).await,
        }
    }

    pub fn update_post_processing_config(&mut self, config: &PostProcessingConfig) {
        match self {
            Pipeline::Raster(p) => p.update_post_processing_config(config),
            Pipeline::Shader(p) => p.update_post_processing_config(config),
        }
    }

    pub fn clean_up(self) {
        match self {
            Pipeline::Raster(p) => p.clean_up(),
            Pipeline::Shader(p) => p.clean_up(),
        }
    }
}

/// How many pipelines were built and torn down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub constructed: usize,
    pub cleaned_up: usize,
}

impl PipelineStats {
    pub fn live(&self) -> usize {
        self.constructed - self.cleaned_up
    }
}

#[derive(Debug, Clone)]
struct ActiveConfig {
    frame_size: (u32, u32),
    background: BackgroundConfig,
    segmentation: SegmentationConfig,
    post_processing: PostProcessingConfig,
}

/// Owns the single live pipeline and everything it renders with.
///
/// Reconfiguration always cleans up the outgoing pipeline before the
/// replacement is built, so at most one pipeline holds the output surface.
pub struct PipelineManager {
    registry: EngineRegistry,
    store: ModelStore,
    segmenter: Option<Box<dyn PersonSegmenter>>,
    gpu: Option<Arc<GpuContext>>,
    supports_filter: bool,
    config: Option<ActiveConfig>,
    active: Option<Pipeline>,
    surface: RgbaImage,
    timer: FrameTimer,
    stats: PipelineStats,
}

impl PipelineManager {
    pub fn new(registry: EngineRegistry, store: ModelStore) -> Self {
        Self {
            registry,
            store,
            segmenter: None,
            gpu: None,
            supports_filter: true,
            config: None,
            active: None,
            surface: RgbaImage::new(0, 0),
            timer: FrameTimer::new(),
            stats: PipelineStats::default(),
        }
    }

    pub fn with_segmenter(mut self, segmenter: Box<dyn PersonSegmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    pub fn with_gpu(mut self, context: Arc<GpuContext>) -> Self {
        self.gpu = Some(context);
        self
    }

    /// Whether the raster canvas can apply blur filters natively.
    pub fn with_native_filter(mut self, supported: bool) -> Self {
        self.supports_filter = supported;
        self
    }

    /// Validates, activates the model, then replaces the live pipeline.
    ///
    /// Every check that can fail runs before the model is activated, so a
    /// rejected configuration leaves the previous pipeline and the engine's
    /// loaded tier untouched. If the new pipeline cannot be built after the
    /// old one was cleaned up, the manager is left unconfigured.
    pub fn configure(
        &mut self,
        frame_size: (u32, u32),
        background: BackgroundConfig,
        segmentation: SegmentationConfig,
        post_processing: PostProcessingConfig,
    ) -> Result<()> {
        segmentation.validate()?;
        post_processing.validate()?;
        if frame_size.0 == 0 || frame_size.1 == 0 {
            return Err(BackdropError::invalid_config("frame size must be non-zero"));
        }

        if segmentation.model == SegmentationModel::Segmenter && self.segmenter.is_none() {
            return Err(BackdropError::invalid_config("no person segmenter was supplied"));
        }
        let gpu = match segmentation.pipeline {
            PipelineKind::Shader => Some(
                self.gpu
                    .clone()
                    .ok_or_else(|| BackdropError::gpu("shader pipeline requested without a gpu context"))?,
            ),
            PipelineKind::Raster => None,
        };
        if segmentation.model == SegmentationModel::Meet {
            self.registry.activate(
                segmentation.backend,
                segmentation.input_resolution,
                &self.store,
            )?;
        }

        self.tear_down();
        let pipeline = match gpu {
            Some(context) => {
                let built = GpuPipeline::new(
                    context,
                    frame_size,
                    background.clone(),
                    &segmentation,
                    post_processing.clone(),
                );
                match built {
                    Ok(pipeline) => Pipeline::Shader(pipeline),
                    Err(e) => {
                        self.config = None;
                        return Err(e);
                    }
                }
            }
            None => Pipeline::Raster(CpuPipeline::new(
                frame_size,
                background.clone(),
                &segmentation,
                post_processing.clone(),
                self.supports_filter,
            )),
        };
        self.stats.constructed += 1;
        tracing::info!("{:?} pipeline active", pipeline.kind());

        self.active = Some(pipeline);
        self.surface = RgbaImage::new(frame_size.0, frame_size.1);
        self.config = Some(ActiveConfig {
            frame_size,
            background,
            segmentation,
            post_processing,
        });
        Ok(())
    }

    /// Changes the background, in place when the live pipeline allows it.
    pub fn update_background(&mut self, background: BackgroundConfig) -> Result<()> {
        let config = self
            .config
            .clone()
            .ok_or_else(|| BackdropError::invalid_config("no pipeline configured"))?;
        if let Some(Pipeline::Shader(pipeline)) = &mut self.active {
            if pipeline.accepts_background(&background) {
                pipeline.set_background(background.clone())?;
                if let Some(active) = &mut self.config {
                    active.background = background;
                }
                return Ok(());
            }
        }
        self.configure(
            config.frame_size,
            background,
            config.segmentation,
            config.post_processing,
        )
    }

    /// Forwards numeric post-processing changes without rebuilding.
    pub fn update_post_processing_config(&mut self, config: PostProcessingConfig) -> Result<()> {
        config.validate()?;
        if let Some(pipeline) = &mut self.active {
            pipeline.update_post_processing_config(&config);
        }
        if let Some(active) = &mut self.config {
            active.post_processing = config;
        }
        Ok(())
    }

    /// Composites one frame and returns the output surface.
    ///
    /// A frame with a new resolution rebuilds the pipeline first.
    pub async fn render(&mut self, frame: &RgbaImage) -> Result<&RgbaImage> {
        let config = self
            .config
            .clone()
            .ok_or_else(|| BackdropError::invalid_config("no pipeline configured"))?;
        if frame.dimensions() != config.frame_size {
            tracing::info!(
                "Frame size changed from {:?} to {:?}, rebuilding pipeline",
                config.frame_size,
                frame.dimensions()
            );
            self.configure(
                frame.dimensions(),
                config.background,
                config.segmentation,
                config.post_processing,
            )?;
        }

        let pipeline = self
            .active
            .as_mut()
            .ok_or_else(|| BackdropError::invalid_config("no pipeline configured"))?;
        let segmentation = config.segmentation;
        let mut backend = match segmentation.model {
            SegmentationModel::Segmenter => {
                let segmenter = self
                    .segmenter
                    .as_deref_mut()
                    .ok_or_else(|| BackdropError::invalid_config("no person segmenter was supplied"))?;
                SegmentationBackend::Segmenter(segmenter)
            }
            SegmentationModel::Meet => {
                let tier = segmentation.input_resolution;
                if self.registry.loaded_tier(segmentation.backend) != Some(tier) {
                    return Err(BackdropError::invalid_config(format!(
                        "{} engine has no {tier:?} model loaded",
                        segmentation.backend
                    )));
                }
                let engine = self.registry.engine_mut(segmentation.backend)?;
                SegmentationBackend::RawBuffer(RawBufferAdapter::new(
                    engine,
                    segmentation.input_resolution.shape(),
                ))
            }
        };

        self.timer.begin_cycle();
        let result = pipeline
            .render(frame, &mut backend, &mut self.timer, &mut self.surface)
            .await;
        self.timer.end_cycle();
        result?;
        Ok(&self.surface)
    }

    /// Cleans up the live pipeline, if any.
    pub fn shutdown(&mut self) {
        self.tear_down();
        self.config = None;
    }

    fn tear_down(&mut self) {
        if let Some(pipeline) = self.active.take() {
            tracing::info!("Cleaning up {:?} pipeline", pipeline.kind());
            pipeline.clean_up();
            self.stats.cleaned_up += 1;
        }
    }

    pub fn active_kind(&self) -> Option<PipelineKind> {
        self.active.as_ref().map(Pipeline::kind)
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn timings(&self) -> FrameTimings {
        self.timer.timings()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn gpu_counts(&self) -> Option<ResourceCounts> {
        self.gpu.as_ref().map(|gpu| gpu.counts())
    }

    pub fn segmentation_config(&self) -> Option<SegmentationConfig> {
        self.config.as_ref().map(|c| c.segmentation)
    }

    pub fn post_processing_config(&self) -> Option<&PostProcessingConfig> {
        self.config.as_ref().map(|c| &c.post_processing)
    }
}

impl Drop for PipelineManager {
    fn drop(&mut self) {
        self.tear_down();
    }
}
