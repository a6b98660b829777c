use anyhow::{Context, Result};
use backdrop::capture::{FrameSource, StillImageSource};
use backdrop::config::BackgroundKind;
use backdrop::gpu::GpuContext;
use backdrop::output::{OutputSink, PngSnapshotSink};
use backdrop::segmentation::{EngineRegistry, ModelStore};
use backdrop::{
    BackgroundConfig, BackgroundImage, BlendMode, ExecutionTarget, FrameTimings, InputResolution,
    JointBilateralFilterConfig, PipelineKind, PipelineManager, PostProcessingConfig,
    SegmentationConfig, SegmentationModel,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Use a still image as the frame source instead of a webcam
    #[arg(long)]
    source_image: Option<PathBuf>,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Write composited frames to this PNG instead of a loopback device
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Frames between two snapshot writes
    #[arg(long, default_value_t = 30)]
    snapshot_interval: u64,

    /// Background shown behind the person
    #[arg(long, value_enum, default_value_t = BackgroundKind::Blur)]
    background: BackgroundKind,

    /// Picture used by `--background image`
    #[arg(long)]
    background_image: Option<PathBuf>,

    /// Compositing pipeline
    #[arg(long, value_enum, default_value_t = PipelineKind::Raster)]
    pipeline: PipelineKind,

    /// Segmentation resolution tier
    #[arg(long, value_enum, default_value_t = InputResolution::V2_96)]
    tier: InputResolution,

    /// Inference execution target
    #[arg(long, value_enum, default_value_t = ExecutionTarget::Cpu)]
    target: ExecutionTarget,

    /// Directory holding the segmentation models
    #[arg(long, default_value = "models")]
    models_dir: PathBuf,

    /// Do not soften the mask before compositing (raster pipeline)
    #[arg(long)]
    no_smooth_mask: bool,

    /// Bilateral spatial sigma; defaults to 4 for raster and 1 for shader
    #[arg(long)]
    sigma_space: Option<f32>,

    /// Bilateral color sigma
    #[arg(long, default_value_t = 0.1)]
    sigma_color: f32,

    /// Raw mask value mapped to fully transparent
    #[arg(long, default_value_t = 0.5)]
    coverage_low: f32,

    /// Raw mask value mapped to fully opaque
    #[arg(long, default_value_t = 0.75)]
    coverage_high: f32,

    /// Share of background color blended onto the silhouette edge
    #[arg(long, default_value_t = 0.3)]
    light_wrapping: f32,

    /// Blend mode used for light wrapping
    #[arg(long, value_enum, default_value_t = BlendMode::Screen)]
    blend_mode: BlendMode,

    /// Force the multi-pass blur fallback on the raster pipeline
    #[arg(long)]
    no_native_blur: bool,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn post_processing(&self) -> PostProcessingConfig {
        let defaults = PostProcessingConfig::for_pipeline(self.pipeline);
        PostProcessingConfig {
            smooth_mask: !self.no_smooth_mask,
            joint_bilateral_filter: JointBilateralFilterConfig {
                sigma_space: self
                    .sigma_space
                    .unwrap_or(defaults.joint_bilateral_filter.sigma_space),
                sigma_color: self.sigma_color,
            },
            coverage: [self.coverage_low, self.coverage_high],
            light_wrapping: self.light_wrapping,
            blend_mode: self.blend_mode,
            ..defaults
        }
    }

    fn background_config(&self) -> Result<BackgroundConfig> {
        Ok(match self.background {
            BackgroundKind::None => BackgroundConfig::None,
            BackgroundKind::Blur => BackgroundConfig::Blur,
            BackgroundKind::Image => {
                let path = self
                    .background_image
                    .clone()
                    .context("--background image needs --background-image")?;
                BackgroundConfig::Image(decode_in_background(path))
            }
        })
    }
}

/// Starts decoding `path` on a worker thread; frames rendered before it
/// finishes simply show no background image.
fn decode_in_background(path: PathBuf) -> BackgroundImage {
    let background = BackgroundImage::pending(path.display().to_string());
    let slot = background.clone();
    std::thread::spawn(move || match image::open(&path) {
        Ok(decoded) => {
            slot.finish_decoding(decoded.to_rgba8());
            tracing::info!("Background image {} decoded", path.display());
        }
        Err(e) => tracing::warn!("Failed to decode background {}: {}", path.display(), e),
    });
    background
}

fn open_source(args: &Args) -> Result<Box<dyn FrameSource>> {
    if let Some(path) = &args.source_image {
        return Ok(Box::new(StillImageSource::open(path)?));
    }
    #[cfg(feature = "camera")]
    {
        let capture = backdrop::capture::WebcamCapture::new(args.input_device)
            .context("Failed to initialize webcam capture")?;
        Ok(Box::new(capture))
    }
    #[cfg(not(feature = "camera"))]
    {
        anyhow::bail!(
            "camera {} requested but camera support is not compiled in; pass --source-image",
            args.input_device
        )
    }
}

fn open_sink(args: &Args, resolution: (u32, u32)) -> Result<Box<dyn OutputSink>> {
    if let Some(path) = &args.snapshot {
        return Ok(Box::new(PngSnapshotSink::new(path, args.snapshot_interval, resolution)));
    }
    #[cfg(feature = "camera")]
    {
        let output =
            backdrop::output::V4L2Output::new(&args.output_device, resolution.0, resolution.1)
                .context("Failed to initialize v4l2loopback output")?;
        Ok(Box::new(output))
    }
    #[cfg(not(feature = "camera"))]
    {
        tracing::warn!(
            "Loopback output {} unavailable without camera support, writing backdrop.png",
            args.output_device
        );
        Ok(Box::new(PngSnapshotSink::new(
            "backdrop.png",
            args.snapshot_interval,
            resolution,
        )))
    }
}

fn create_registry(target: ExecutionTarget) -> EngineRegistry {
    #[cfg(feature = "onnx")]
    {
        backdrop::segmentation::create_default_registry(&[target])
    }
    #[cfg(not(feature = "onnx"))]
    {
        tracing::warn!(
            "Built without the onnx feature, no {} inference engine is available",
            target
        );
        EngineRegistry::new()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Backdrop starting");

    let mut source = open_source(&args)?;
    let resolution = source.resolution();
    tracing::info!("Source: {}x{}", resolution.0, resolution.1);
    tracing::info!("Target FPS: {}", args.fps);
    let mut sink = open_sink(&args, resolution)?;

    let mut manager = PipelineManager::new(
        create_registry(args.target),
        ModelStore::new(&args.models_dir),
    )
    .with_native_filter(!args.no_native_blur);
    if args.pipeline == PipelineKind::Shader {
        let context = GpuContext::new().context("Failed to initialize GPU")?;
        manager = manager.with_gpu(Arc::new(context));
    }

    let segmentation = SegmentationConfig {
        model: SegmentationModel::Meet,
        backend: args.target,
        input_resolution: args.tier,
        pipeline: args.pipeline,
    };
    manager
        .configure(
            resolution,
            args.background_config()?,
            segmentation,
            args.post_processing(),
        )
        .context("Failed to configure pipeline")?;

    run_pipeline(source.as_mut(), sink.as_mut(), &mut manager, args.fps, args.frames)?;

    manager.shutdown();
    let stats = manager.stats();
    tracing::info!(
        "Pipelines constructed: {}, cleaned up: {}",
        stats.constructed,
        stats.cleaned_up
    );
    Ok(())
}

fn format_ms(value: Option<f64>) -> String {
    value
        .map(|ms| format!("{ms:.1}ms"))
        .unwrap_or_else(|| "-".to_string())
}

fn log_timings(frame_count: u64, timings: &FrameTimings) {
    tracing::info!(
        "Frame {}: resize={}, inference={}, post={}, fps={:.1}",
        frame_count,
        format_ms(timings.resize_ms()),
        format_ms(timings.inference_ms()),
        format_ms(timings.post_process_ms()),
        timings.fps
    );
}

fn run_pipeline(
    source: &mut dyn FrameSource,
    sink: &mut dyn OutputSink,
    manager: &mut PipelineManager,
    target_fps: u32,
    frame_limit: Option<u64>,
) -> Result<()> {
    let frame_duration = Duration::from_secs_f32(1.0 / target_fps.max(1) as f32);
    let mut frame_count = 0u64;

    tracing::info!("Starting main pipeline loop");
    tracing::info!("Press Ctrl+C to stop");

    loop {
        let loop_start = Instant::now();

        let frame = source.next_frame().context("Failed to capture frame")?;
        let composited =
            pollster::block_on(manager.render(&frame)).context("Failed to composite frame")?;
        sink.write_frame(composited)
            .context("Failed to write frame")?;

        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            log_timings(frame_count, &manager.timings());
        }

        if frame_limit.is_some_and(|limit| frame_count >= limit) {
            tracing::info!("Frame limit {} reached", frame_count);
            return Ok(());
        }

        // Frame rate limiting
        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }
}
