mod frame_source;

use std::path::{Path, PathBuf};
use std::process;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use facemask_core::capture::capture_controller::{CaptureController, CaptureOutcome};
use facemask_core::capture::infrastructure::jpeg_file_sink::JpegFileSink;
use facemask_core::detection::domain::face_detector::DetectorSet;
use facemask_core::detection::infrastructure::deadline_detector::DeadlineDetector;
use facemask_core::detection::infrastructure::model_resolver::{ModelResolver, ModelSpec};
use facemask_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use facemask_core::detection::infrastructure::unavailable_detector::UnavailableDetector;
use facemask_core::pipeline::frame_pipeline::FramePipeline;
use facemask_core::pipeline::masking_session::MaskingSession;
use facemask_core::pipeline::session_config::SessionConfig;
use facemask_core::profile::capability_profile::{
    CapabilityProfile, DetectorPerformanceMode, DeviceTier, DeviceTierSignal,
};
use facemask_core::rendering::infrastructure::cpu_blur_compositor::CpuBlurCompositor;
use facemask_core::shared::constants::{YOLO_MODEL_NAME, YOLO_MODEL_URL};
use facemask_core::shared::frame::{CameraFacing, Frame};

use frame_source::{is_image, FrameSource};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// How long to wait for the renderer to produce the frames a capture needs.
const FRAME_WAIT: Duration = Duration::from_secs(10);

const CAPTURE_ATTEMPTS: u32 = 3;
/// Frames rendered between capture attempts.
const RETRY_FRAMES: u64 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TierArg {
    Auto,
    High,
    Recent,
    Low,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FacingArg {
    Back,
    Front,
}

/// Face privacy masking over a replayed camera feed.
///
/// Plays the input images as camera frames through the live masking
/// pipeline, then captures a masked still into the output directory.
#[derive(Parser)]
#[command(name = "facemask")]
struct Cli {
    /// Input images or directories of images, replayed in order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for captured stills.
    #[arg(long)]
    out: PathBuf,

    /// Camera the frames come from. Front-camera frames are mirrored.
    #[arg(long, value_enum, default_value = "back")]
    facing: FacingArg,

    /// Preview size as WxH (defaults to the first frame's size).
    #[arg(long, value_parser = parse_view)]
    view: Option<(u32, u32)>,

    /// Device tier; `auto` derives it from --memory-gb and --device-year.
    #[arg(long, value_enum, default_value = "auto")]
    tier: TierArg,

    /// Device memory in GiB, for --tier auto.
    #[arg(long, default_value = "8")]
    memory_gb: f64,

    /// Device release year, for --tier auto.
    #[arg(long, default_value = "2024")]
    device_year: u16,

    /// Capability profile JSON (overrides --tier).
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Session config JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// YOLO face model (downloaded to the cache if omitted).
    #[arg(long, conflicts_with = "no_detector")]
    model: Option<PathBuf>,

    /// Run without a face detector, masking from the fallback tiers only.
    #[arg(long)]
    no_detector: bool,

    /// Frames to render before capturing.
    #[arg(long, default_value = "30")]
    capture_after: u64,

    /// Replay rate of the camera feed.
    #[arg(long, default_value = "30")]
    fps: f64,

    /// Save every rendered preview frame to this directory.
    #[arg(long)]
    preview_dir: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let profile = build_profile(&cli)?;
    let config = match &cli.config {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    let detectors = build_detectors(&cli, &profile, &config)?;

    let facing = match cli.facing {
        FacingArg::Back => CameraFacing::Back,
        FacingArg::Front => CameraFacing::Front,
    };
    let source = FrameSource::open(&cli.inputs, facing, cli.fps)?;
    let (view_w, view_h) = cli.view.unwrap_or_else(|| source.frame_size());

    if let Some(dir) = &cli.preview_dir {
        std::fs::create_dir_all(dir)?;
    }

    let mut session = MaskingSession::begin(
        profile,
        config,
        detectors,
        Box::new(CpuBlurCompositor::new()),
        Box::new(JpegFileSink::new(&cli.out)),
    )?;
    session.set_view_size(view_w, view_h);

    let (pipeline, mut controller) = session.split();
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    let (rendered_tx, rendered_rx) = crossbeam_channel::unbounded::<u64>();
    let renderer = spawn_renderer(
        pipeline,
        source,
        cli.fps,
        cli.preview_dir.clone(),
        stop_rx,
        rendered_tx,
    );

    let captured = wait_for_frames(&rendered_rx, cli.capture_after)
        .and_then(|()| capture_with_retry(&mut controller, &rendered_rx));

    let _ = stop_tx.send(());
    controller.end();
    let mut pipeline = renderer
        .join()
        .map_err(|_| "Render thread panicked")?;
    pipeline.end();

    let outcome = captured?;
    log::info!(
        "Capture finished after {} pass(es) in {} mode, {} region(s) masked",
        outcome.captures,
        outcome.method_at_capture,
        outcome.regions.len()
    );
    println!("{}", outcome.image.location);
    Ok(())
}

/// Drives the rendering half on its own thread at the replay rate, as a
/// camera callback would, until told to stop.
fn spawn_renderer(
    mut pipeline: FramePipeline,
    mut source: FrameSource,
    fps: f64,
    preview_dir: Option<PathBuf>,
    stop_rx: Receiver<()>,
    rendered_tx: Sender<u64>,
) -> JoinHandle<FramePipeline> {
    let interval = Duration::from_secs_f64(1.0 / fps);
    std::thread::spawn(move || {
        let mut rendered: u64 = 0;
        while let Err(TryRecvError::Empty) = stop_rx.try_recv() {
            let started = Instant::now();
            let frame = source.next_frame();
            let output = pipeline.on_frame(&frame);

            if let Some(dir) = &preview_dir {
                if let Err(e) = save_preview(dir, &output.frame) {
                    log::warn!("Failed to save preview frame {}: {e}", frame.index());
                }
            }
            rendered += 1;
            let _ = rendered_tx.send(rendered);

            std::thread::sleep(interval.saturating_sub(started.elapsed()));
        }
        pipeline
    })
}

fn wait_for_frames(
    rendered_rx: &Receiver<u64>,
    wanted: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        match rendered_rx.recv_timeout(FRAME_WAIT) {
            Ok(count) if count >= wanted => return Ok(()),
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                return Err(format!(
                    "Renderer produced no frame within {}s",
                    FRAME_WAIT.as_secs()
                )
                .into())
            }
            Err(RecvTimeoutError::Disconnected) => return Err("Render thread stopped".into()),
        }
    }
}

/// Captures, retrying once more frames have rendered when the failure is
/// transient (nothing masked yet, sink hiccup).
fn capture_with_retry(
    controller: &mut CaptureController,
    rendered_rx: &Receiver<u64>,
) -> Result<CaptureOutcome, Box<dyn std::error::Error>> {
    let mut attempt = 1;
    loop {
        match controller.capture() {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_retryable() && attempt < CAPTURE_ATTEMPTS => {
                log::warn!("Capture attempt {attempt} failed, retrying: {e}");
                attempt += 1;
                let rendered = rendered_rx.try_iter().last().unwrap_or(0);
                wait_for_frames(rendered_rx, rendered + RETRY_FRAMES)?;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn save_preview(dir: &Path, frame: &Frame) -> image::ImageResult<()> {
    let path = dir.join(format!("preview_{:05}.png", frame.index()));
    image::save_buffer(
        path,
        frame.data(),
        frame.width(),
        frame.height(),
        image::ExtendedColorType::Rgb8,
    )
}

fn build_profile(cli: &Cli) -> Result<CapabilityProfile, Box<dyn std::error::Error>> {
    if let Some(path) = &cli.profile {
        return Ok(CapabilityProfile::from_json_file(path)?);
    }
    let profile = match cli.tier {
        TierArg::Auto => CapabilityProfile::from_signal(&DeviceTierSignal {
            total_memory_bytes: (cli.memory_gb * GIB) as u64,
            device_year: cli.device_year,
        }),
        TierArg::High => CapabilityProfile::for_tier(DeviceTier::High),
        TierArg::Recent => CapabilityProfile::for_tier(DeviceTier::Recent),
        TierArg::Low => CapabilityProfile::for_tier(DeviceTier::Low),
    };
    Ok(profile)
}

fn build_detectors(
    cli: &Cli,
    profile: &CapabilityProfile,
    config: &SessionConfig,
) -> Result<DetectorSet, Box<dyn std::error::Error>> {
    if cli.no_detector {
        log::warn!("No face detector: masks come from the heuristic and aggressive tiers only");
        return Ok(DetectorSet::new(Box::new(UnavailableDetector)));
    }

    let model_path = match &cli.model {
        Some(path) => path.clone(),
        None => {
            log::info!("Resolving model: {YOLO_MODEL_NAME}");
            let path = ModelResolver::new()?
                .on_progress(Box::new(download_progress))
                .resolve(&ModelSpec::new(YOLO_MODEL_NAME, YOLO_MODEL_URL))?;
            eprintln!();
            path
        }
    };

    let deadline = config.detector_deadline();
    let fast = OnnxYoloDetector::for_mode(&model_path, profile.detector_performance_mode)?;
    let accurate = OnnxYoloDetector::for_mode(&model_path, DetectorPerformanceMode::Accurate)?;
    Ok(
        DetectorSet::new(Box::new(DeadlineDetector::new(Box::new(fast), deadline)))
            .with_accurate(Box::new(DeadlineDetector::new(Box::new(accurate), deadline))),
    )
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    for input in &cli.inputs {
        if !input.exists() {
            return Err(format!("Input not found: {}", input.display()).into());
        }
        if input.is_file() && !is_image(input) {
            return Err(format!("Not a supported image: {}", input.display()).into());
        }
    }
    if cli.out.is_file() {
        return Err(format!("Output must be a directory: {}", cli.out.display()).into());
    }
    if !(cli.fps.is_finite() && cli.fps > 0.0) {
        return Err(format!("FPS must be positive, got {}", cli.fps).into());
    }
    if cli.capture_after == 0 {
        return Err("--capture-after must be at least 1".into());
    }
    if !(cli.memory_gb.is_finite() && cli.memory_gb >= 0.0) {
        return Err(format!("Memory must be non-negative, got {}", cli.memory_gb).into());
    }
    if let Some(model) = &cli.model {
        if !model.is_file() {
            return Err(format!("Model file not found: {}", model.display()).into());
        }
    }
    Ok(())
}

fn parse_view(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{value}'"))?;
    let width: u32 = w.trim().parse().map_err(|_| format!("invalid width '{w}'"))?;
    let height: u32 = h.trim().parse().map_err(|_| format!("invalid height '{h}'"))?;
    if width == 0 || height == 0 {
        return Err(format!("view must be non-empty, got {width}x{height}"));
    }
    Ok((width, height))
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
