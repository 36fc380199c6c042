// mirrorcam command line interface
// Runs the capture loop over recorded frames, analyses single images, lists models

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mirrorcam_eye::capture::CaptureEvent;
use mirrorcam_eye::{
    CaptureController, CapturePreset, DetectionModel, DetectionPipeline, Dispatcher,
    DispatchOutcome, FrameLoop, FrameSource, ImageSequenceSource, LoopExit, MirrorcamConfig,
    ModelConfig, ModelRegistry, ReplayModel,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mirrorcam")]
#[command(about = "Detect, capture and describe clothing from a camera feed", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the capture loop over a directory of frames
    Run {
        /// Directory of still images, replayed in name order
        frames: PathBuf,

        /// Registry model name
        #[arg(long, short)]
        model: Option<String>,

        /// Capture preset (immediate, countdown, rolling_window)
        #[arg(long, short)]
        preset: Option<String>,

        /// Recorded raw model outputs (JSON) to replay instead of running a model
        #[arg(long)]
        replay: Option<PathBuf>,

        /// ONNX weights (needs the onnx feature)
        #[arg(long)]
        onnx: Option<PathBuf>,

        /// Frames per second
        #[arg(long)]
        fps: Option<u32>,

        /// Start over when the directory is exhausted
        #[arg(long = "loop")]
        looping: bool,
    },

    /// Detect in one image and send the best crop for analysis
    Analyse {
        image: PathBuf,

        #[arg(long, short)]
        model: Option<String>,

        #[arg(long)]
        replay: Option<PathBuf>,

        #[arg(long)]
        onnx: Option<PathBuf>,
    },

    /// List available detection models
    Models,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let mut config = MirrorcamConfig::load(cli.config.as_deref()).context("Invalid configuration")?;

    match cli.command {
        Commands::Run {
            frames,
            model,
            preset,
            replay,
            onnx,
            fps,
            looping,
        } => {
            if let Some(preset) = preset {
                let preset = CapturePreset::from_str(&preset)
                    .with_context(|| format!("Unknown preset '{}'", preset))?;
                config.preset = Some(preset);
                config.policy = preset.config();
            }
            if let Some(fps) = fps {
                config.frame_loop.fps = fps;
            }
            apply_model_flags(&mut config, model, replay, onnx);
            config.validate()?;
            run_capture(&config, &frames, looping).await?;
        }
        Commands::Analyse {
            image,
            model,
            replay,
            onnx,
        } => {
            apply_model_flags(&mut config, model, replay, onnx);
            analyse_image(&config, &image).await?;
        }
        Commands::Models => list_models(),
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);
        }
    }

    Ok(())
}

fn apply_model_flags(
    config: &mut MirrorcamConfig,
    model: Option<String>,
    replay: Option<PathBuf>,
    onnx: Option<PathBuf>,
) {
    if let Some(model) = model {
        config.model.name = model;
    }
    if replay.is_some() {
        config.model.replay = replay;
    }
    if onnx.is_some() {
        config.model.path = onnx;
    }
}

fn list_models() {
    let registry = ModelRegistry::builtin();
    println!("Available models:");
    for name in registry.available_models() {
        if let Some(model) = registry.get(name) {
            println!(
                "  {:<18} {:<18} target={} ({} classes, {}x{})",
                model.name,
                model.display_name,
                model.target_class,
                model.num_classes(),
                model.input_width,
                model.input_height
            );
        }
    }
}

fn resolve_model(config: &MirrorcamConfig) -> anyhow::Result<ModelConfig> {
    let registry = ModelRegistry::builtin();
    registry
        .get_or_default(&config.model.name)
        .cloned()
        .context("Model registry is empty")
}

fn build_detector(config: &MirrorcamConfig, model: &ModelConfig) -> anyhow::Result<Arc<dyn DetectionModel>> {
    if let Some(replay) = &config.model.replay {
        let detector = ReplayModel::from_json_file(replay, 4 + model.num_classes())
            .with_context(|| format!("Failed to load replay file {}", replay.display()))?;
        return Ok(Arc::new(detector));
    }

    if let Some(path) = &config.model.path {
        #[cfg(feature = "onnx")]
        {
            let detector = mirrorcam_eye::models::OnnxModel::load(path)
                .with_context(|| format!("Failed to load model {}", path.display()))?;
            return Ok(Arc::new(detector));
        }
        #[cfg(not(feature = "onnx"))]
        bail!(
            "Model weights {} given but mirrorcam was built without the onnx feature",
            path.display()
        );
    }

    bail!("No detector configured: pass --replay, or --onnx with the onnx feature")
}

async fn build_pipeline(config: &MirrorcamConfig) -> anyhow::Result<DetectionPipeline> {
    let model = resolve_model(config)?;
    let detector = build_detector(config, &model)?;
    info!("Using {} ({})", model.display_name, detector.name());

    let pipeline = DetectionPipeline::new(detector, model, config.nms, config.crop);
    if config.model.warm_up {
        if let Err(e) = pipeline.warm_up().await {
            warn!("Model warm-up failed: {}", e);
        }
    }
    Ok(pipeline)
}

fn build_dispatcher(config: &MirrorcamConfig) -> anyhow::Result<Dispatcher> {
    let provider = mirrorcam_llm::build_provider(&config.analysis)
        .context("Failed to set up the analysis provider")?;
    Ok(Dispatcher::new(provider))
}

async fn run_capture(config: &MirrorcamConfig, frames: &Path, looping: bool) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)
        .await?
        .with_crop_threshold(config.policy.crop_threshold());
    let dispatcher = build_dispatcher(config)?;
    info!("Captures will be analysed via {}", dispatcher.provider_name());
    let controller = CaptureController::new(config.policy, dispatcher);

    let mut events = controller.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} capture events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut source = ImageSequenceSource::from_dir(frames, config.frame_loop.fps)?.looping(looping);
    let frame_loop = FrameLoop::new(pipeline, controller, config.frame_loop.clone());
    let summary = frame_loop.run(&mut source).await?;
    printer.abort();

    println!(
        "Processed {} frames ({} dropped)",
        summary.frames, summary.dropped
    );
    match summary.exit {
        LoopExit::Dispatched(outcome) => print_outcome(&outcome)?,
        LoopExit::SourceExhausted => println!("No capture: ran out of frames"),
        LoopExit::FrameLimit => println!("No capture: frame limit reached"),
    }
    Ok(())
}

async fn analyse_image(config: &MirrorcamConfig, image: &Path) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config).await?;
    let dispatcher = build_dispatcher(config)?;

    let mut source = ImageSequenceSource::new(vec![image.to_path_buf()], 1);
    let frame = source
        .next_frame()
        .await?
        .with_context(|| format!("Could not read image {}", image.display()))?;

    let crops = pipeline.process_frame(&frame).await?;
    let best = crops
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .with_context(|| {
            format!(
                "No {} found at or above {:.0}%",
                pipeline.model_config().target_class,
                pipeline.crop_threshold() * 100.0
            )
        })?;

    println!("Best crop: {} ({}%)", best.id, best.score);
    let outcome = dispatcher.dispatch(best).await;
    print_outcome(&outcome)
}

fn print_event(event: &CaptureEvent) {
    match event {
        CaptureEvent::Triggered { window_ms, .. } => {
            println!("Target detected, collecting for {:.1}s", *window_ms as f64 / 1000.0)
        }
        CaptureEvent::CandidatesUpdated { count, best_score, .. } => println!(
            "  {} candidates, best {}%",
            count,
            best_score.as_deref().unwrap_or("-")
        ),
        CaptureEvent::WindowExpired { .. } => println!("Window closed with no usable crop"),
        CaptureEvent::Finalized { crop_id, score, .. } => {
            println!("Selected {} ({}%), analysing...", crop_id, score)
        }
        CaptureEvent::Reset { generation } => println!("Reset (attempt {})", generation + 1),
        CaptureEvent::Analysed { .. } | CaptureEvent::DispatchFailed { .. } => {}
    }
}

fn print_outcome(outcome: &DispatchOutcome) -> anyhow::Result<()> {
    match outcome {
        DispatchOutcome::Analysed { text, provider } => {
            println!("\nAnalysis ({}):\n{}", provider, text);
            Ok(())
        }
        DispatchOutcome::Failed { message } => bail!("Analysis failed: {}", message),
    }
}
