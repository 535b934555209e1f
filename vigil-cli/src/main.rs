// Vigil command line interface
// Runs object detection over an image file or a live test-pattern feed

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vigil_core::{ContainerSize, DetectionMode, DetectionSettings};
use vigil_eye::{
    DetectionSession, DetectionStats, OverlayBox, ReplayDetector, ReplayScript, TestPatternCamera,
    VisionConfig,
};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Object detection over images and live camera feeds", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (toml, yaml or json)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect objects in a single image file
    DetectImage {
        /// Image to analyse
        path: PathBuf,

        /// Replay script providing the detector output
        #[arg(long, short)]
        script: Option<PathBuf>,

        /// Minimum confidence (0.1 - 1.0)
        #[arg(long, short)]
        threshold: Option<f32>,

        /// Maximum detections (1 - 20)
        #[arg(long, short)]
        max_detections: Option<u32>,

        /// Display container as WIDTHxHEIGHT; defaults to the image size
        #[arg(long, value_parser = parse_container)]
        container: Option<ContainerSize>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Run live detection against the test-pattern camera
    Watch {
        /// Replay script providing the detector output
        #[arg(long, short)]
        script: Option<PathBuf>,

        /// Stop after this many seconds; runs until Ctrl-C otherwise
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Minimum confidence (0.1 - 1.0)
        #[arg(long, short)]
        threshold: Option<f32>,
    },

    /// Print the effective configuration
    Config {
        #[arg(long, short, value_enum, default_value = "toml")]
        format: ConfigFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum ConfigFormat {
    Toml,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::DetectImage {
            path,
            script,
            threshold,
            max_detections,
            container,
            format,
        } => {
            detect_image(config, &path, script.as_deref(), threshold, max_detections, container, format)
                .await?;
        }
        Commands::Watch {
            script,
            duration_secs,
            threshold,
        } => {
            watch(config, script.as_deref(), duration_secs, threshold).await?;
        }
        Commands::Config { format } => {
            show_config(&config, format)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json_logs: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<VisionConfig> {
    let mut config = match path {
        Some(path) => VisionConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => VisionConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("Invalid VIGIL_* environment override")?;
    Ok(config)
}

fn load_script(path: Option<&Path>) -> Result<ReplayScript> {
    match path {
        Some(path) => ReplayScript::from_file(path)
            .with_context(|| format!("Failed to load replay script {}", path.display())),
        None => {
            warn!("No replay script given, the detector will report nothing");
            Ok(ReplayScript::default())
        }
    }
}

fn parse_container(s: &str) -> std::result::Result<ContainerSize, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {}", s))?;
    let width: f32 = w.trim().parse().map_err(|_| format!("invalid width: {}", w))?;
    let height: f32 = h.trim().parse().map_err(|_| format!("invalid height: {}", h))?;
    ContainerSize::new(width, height).map_err(|e| e.to_string())
}

fn media_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let media_type = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    };
    Some(media_type)
}

fn apply_overrides(
    session: &DetectionSession,
    threshold: Option<f32>,
    max_detections: Option<u32>,
) -> Result<()> {
    let mut settings: DetectionSettings = session.settings();
    if let Some(t) = threshold {
        settings.confidence_threshold = t;
    }
    if let Some(m) = max_detections {
        settings.max_detections = m;
    }
    session.update_settings(settings)?;
    Ok(())
}

async fn detect_image(
    mut config: VisionConfig,
    path: &Path,
    script: Option<&Path>,
    threshold: Option<f32>,
    max_detections: Option<u32>,
    container: Option<ContainerSize>,
    format: OutputFormat,
) -> Result<()> {
    config.initial_mode = DetectionMode::Image;
    let detector = Arc::new(ReplayDetector::new(load_script(script)?));
    let session = DetectionSession::new(config, detector, Arc::new(TestPatternCamera::new()))?;
    session.open().await?;
    apply_overrides(&session, threshold, max_detections)?;

    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    session
        .select_image(&bytes, media_type_for(path))
        .await
        .map_err(|e| anyhow!("{}: {}", path.display(), e.user_message()))?;

    let container = container.unwrap_or_else(|| session.frame_size().into());
    session.resize_container(container.width, container.height)?;

    let stats = session.statistics();
    let overlay = session.overlay();
    match format {
        OutputFormat::Json => {
            let output = json!({
                "image": path.display().to_string(),
                "status": session.status(),
                "statistics": stats,
                "overlay": overlay,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => print_table(&stats, &overlay),
    }

    session.shutdown();
    Ok(())
}

fn print_table(stats: &DetectionStats, overlay: &[OverlayBox]) {
    println!(
        "Objects: {}  Avg confidence: {}%  Labels: {}",
        stats.count,
        stats.average_percent(),
        stats.distinct_labels
    );
    if overlay.is_empty() {
        println!("No objects detected");
        return;
    }

    println!();
    println!(
        "{:<20} {:>6} {:<7} {:>8} {:>8} {:>8} {:>8}",
        "LABEL", "SCORE", "TIER", "X", "Y", "WIDTH", "HEIGHT"
    );
    for b in overlay {
        println!(
            "{:<20} {:>5.0}% {:<7} {:>8.1} {:>8.1} {:>8.1} {:>8.1}",
            b.label,
            b.score * 100.0,
            b.tier.as_str(),
            b.bbox.x,
            b.bbox.y,
            b.bbox.width,
            b.bbox.height
        );
    }

    println!();
    for summary in &stats.per_label {
        println!(
            "{:<20} x{:<3} best {:.0}%",
            summary.label,
            summary.count,
            summary.best_confidence * 100.0
        );
    }
}

async fn watch(
    mut config: VisionConfig,
    script: Option<&Path>,
    duration_secs: Option<u64>,
    threshold: Option<f32>,
) -> Result<()> {
    config.initial_mode = DetectionMode::Webcam;
    let detector = Arc::new(ReplayDetector::new(load_script(script)?));
    let session = DetectionSession::new(config, detector, Arc::new(TestPatternCamera::new()))?;
    session.open().await?;
    apply_overrides(&session, threshold, None)?;

    if let Some(err) = session.error() {
        return Err(anyhow!(err.message));
    }
    session.start_detection()?;

    let deadline = duration_secs.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut report = tokio::time::interval(Duration::from_secs(1));
    report.tick().await;

    loop {
        tokio::select! {
            _ = report.tick() => log_stats(&session.statistics()),
            _ = until(deadline) => {
                info!("Watch duration elapsed");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    session.shutdown();
    Ok(())
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn log_stats(stats: &DetectionStats) {
    let labels: Vec<String> = stats
        .per_label
        .iter()
        .map(|s| format!("{} x{}", s.label, s.count))
        .collect();
    info!(
        "{} objects, avg confidence {}%, labels [{}]",
        stats.count,
        stats.average_percent(),
        labels.join(", ")
    );
}

fn show_config(config: &VisionConfig, format: ConfigFormat) -> Result<()> {
    let rendered = match format {
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
    };
    println!("{}", rendered);
    Ok(())
}
