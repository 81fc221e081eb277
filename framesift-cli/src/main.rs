// framesift command line interface
// Scans a directory of videos and keeps the frames a detector is confident about

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use framesift_core::{OutputMode, PipelineConfig};
use framesift_eye::{Detector, Pipeline, ShutdownToken, VideoBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "framesift")]
#[command(about = "Sample video frames, run object detection and keep the confident ones", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every video in the input directory
    Run(RunArgs),

    /// Print the effective configuration as TOML
    Config {
        /// Configuration file (JSON, TOML or YAML)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Configuration file (JSON, TOML or YAML)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Directory of input videos
    #[arg(long)]
    input: Option<PathBuf>,

    /// Directory for annotated frames
    #[arg(long)]
    results: Option<PathBuf>,

    /// Directory for raw frames and crops
    #[arg(long)]
    processed: Option<PathBuf>,

    /// ONNX model file
    #[arg(long)]
    model: Option<PathBuf>,

    /// Output mode (full, cropped)
    #[arg(long)]
    mode: Option<OutputMode>,

    /// Persist frames with a detection scoring above this
    #[arg(long)]
    threshold: Option<f32>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG is used when unset
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(input) = &self.input {
            config.input_dir = input.clone();
        }
        if let Some(results) = &self.results {
            config.results_dir = results.clone();
        }
        if let Some(processed) = &self.processed {
            config.processed_dir = processed.clone();
        }
        if let Some(model) = &self.model {
            config.model_path = model.clone();
        }
        if let Some(mode) = self.mode {
            config.output_mode = mode;
        }
        if let Some(threshold) = self.threshold {
            config.confidence_threshold = threshold;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            init_logging(args.log_level.as_deref(), args.json_logs)?;
            run_pipeline(args).await?;
        }
        Commands::Config { config } => {
            let config = load_config(config.as_ref(), |key| std::env::var(key).ok())?;
            config.validate()?;
            print!("{}", config.to_toml().context("Failed to render configuration")?);
        }
    }

    Ok(())
}

fn init_logging(level: Option<&str>, json: bool) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("Invalid log level '{}'", level))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

/// File (or defaults) with `FRAMESIFT_*` overrides on top. Not validated:
/// command line flags still get a say.
fn load_config<F>(path: Option<&PathBuf>, env: F) -> anyhow::Result<PipelineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.apply_env_from(env).context("Invalid FRAMESIFT_* environment override")?;
    Ok(config)
}

/// Flags over environment over file over defaults, validated once at the end.
fn resolve_config<F>(args: &RunArgs, env: F) -> anyhow::Result<PipelineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = load_config(args.config.as_ref(), env)?;
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args, |key| std::env::var(key).ok())?;

    let backend = video_backend()?;
    let detector = detector(&config)?;
    let pipeline = Pipeline::new(config, backend, detector)?;

    tokio::spawn(cancel_on_signal(pipeline.shutdown_token()));

    let report = pipeline.run().await?;
    if report.cancelled() {
        warn!("Run was interrupted; outputs are incomplete");
    }

    println!(
        "{} videos ({} failed), {} batches ({} failed), {} frames selected, {} artifacts in {:.2?}",
        report.batcher.videos_seen,
        report.batcher.videos_failed,
        report.consumer.batches_processed,
        report.consumer.batches_failed,
        report.consumer.frames_selected,
        report.consumer.artifacts_written,
        report.elapsed
    );
    Ok(())
}

async fn cancel_on_signal(token: ShutdownToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping workers");
    token.cancel();
}

#[cfg(feature = "opencv")]
fn video_backend() -> anyhow::Result<Arc<dyn VideoBackend>> {
    Ok(Arc::new(framesift_eye::OpenCvBackend::new()))
}

#[cfg(not(feature = "opencv"))]
fn video_backend() -> anyhow::Result<Arc<dyn VideoBackend>> {
    anyhow::bail!("framesift was built without video decoding; rebuild with `--features opencv`")
}

#[cfg(feature = "onnx")]
fn detector(config: &PipelineConfig) -> anyhow::Result<Box<dyn Detector>> {
    Ok(Box::new(framesift_eye::YoloDetector::from_config(config)?))
}

#[cfg(not(feature = "onnx"))]
fn detector(_config: &PipelineConfig) -> anyhow::Result<Box<dyn Detector>> {
    anyhow::bail!("framesift was built without a detector; rebuild with `--features onnx`")
}
