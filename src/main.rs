use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use clipshop::{
    config::Config,
    jobs::{JobService, JobStatus, TransformRequest},
    video::{FfmpegBackend, MediaBackend, OutputFormat, SyntheticBackend},
};

#[derive(Parser)]
#[command(
    name = "clipshop",
    version,
    about = "Trim, crop, resize, retime and apply effects to a video clip",
    long_about = "clipshop runs one transform job through the same asynchronous job engine a server would use: \
                  the input is staged, processed in batches in the background, polled for progress, and the \
                  result copied to the requested output path."
)]
struct Cli {
    /// Input video file
    #[arg(short, long)]
    input: PathBuf,

    /// Where to copy the finished video
    #[arg(short, long)]
    output: PathBuf,

    /// Action: trim, crop, resize, brighten, darken, sepia, cool, warm, grayscale,
    /// negative, blur, motion_blur, radial_blur, text, speedup, slowdown, reverse
    #[arg(short, long, default_value = "trim")]
    action: String,

    /// Window start in seconds
    #[arg(long, default_value_t = 0.0)]
    start: f64,

    /// Window end in seconds (0 = end of clip)
    #[arg(long, default_value_t = 0.0)]
    end: f64,

    #[arg(long)]
    crop_x: Option<u32>,

    #[arg(long)]
    crop_y: Option<u32>,

    #[arg(long)]
    crop_width: Option<u32>,

    #[arg(long)]
    crop_height: Option<u32>,

    /// Output width (defaults to the crop width)
    #[arg(long)]
    width: Option<u32>,

    /// Output height (defaults to the crop height)
    #[arg(long)]
    height: Option<u32>,

    /// Output container: mp4, avi, mov
    #[arg(short, long, default_value = "mp4")]
    format: String,

    #[arg(long, default_value_t = 1.0)]
    brightness: f32,

    #[arg(long)]
    gamma: Option<f32>,

    /// Scale only the HSV value channel
    #[arg(long)]
    preserve_colors: bool,

    /// Speed factor for speedup, slowdown and reverse
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Slow-down frame synthesis: interpolate or duplicate
    #[arg(long)]
    speed_mode: Option<String>,

    /// Color grade intensity
    #[arg(long, default_value_t = 1.0)]
    intensity: f32,

    #[arg(long, default_value_t = 0.5)]
    blur_intensity: f32,

    #[arg(long)]
    text: Option<String>,

    /// center, top or bottom
    #[arg(long)]
    text_position: Option<String>,

    #[arg(long, requires = "text_y")]
    text_x: Option<i32>,

    #[arg(long, requires = "text_x")]
    text_y: Option<i32>,

    #[arg(long, default_value_t = 1.0)]
    text_scale: f32,

    /// Text color as r,g,b
    #[arg(long, value_parser = parse_color)]
    text_color: Option<[u8; 3]>,

    #[arg(long, default_value_t = 1)]
    text_thickness: u32,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the in-process synthetic backend instead of ffmpeg (writes raw RGB)
    #[arg(long)]
    synthetic: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn request(&self) -> TransformRequest {
        TransformRequest {
            action: self.action.clone(),
            start_time: self.start,
            end_time: self.end,
            crop_x: self.crop_x,
            crop_y: self.crop_y,
            crop_width: self.crop_width,
            crop_height: self.crop_height,
            output_width: self.width,
            output_height: self.height,
            output_format: self.format.clone(),
            brightness_factor: self.brightness,
            gamma: self.gamma,
            preserve_colors: self.preserve_colors,
            speed_factor: self.speed,
            speed_mode: self.speed_mode.clone(),
            intensity: self.intensity,
            blur_intensity: self.blur_intensity,
            text: self.text.clone(),
            text_position: self.text_position.clone(),
            text_x: self.text_x,
            text_y: self.text_y,
            text_scale: self.text_scale,
            text_color: self.text_color,
            text_thickness: self.text_thickness,
        }
    }
}

fn parse_color(value: &str) -> std::result::Result<[u8; 3], String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected r,g,b but got '{}'", value));
    }
    let mut color = [0u8; 3];
    for (slot, part) in color.iter_mut().zip(parts) {
        *slot = part.parse().map_err(|_| format!("'{}' is not a value between 0 and 255", part))?;
    }
    Ok(color)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(format!("clipshop={}", level).parse()?))
        .init();

    info!("Starting clipshop v{}", env!("CARGO_PKG_VERSION"));
    info!("Input: {:?}", cli.input);
    info!("Output: {:?}", cli.output);
    info!("Action: {}", cli.action);

    // Load configuration
    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    let backend: Arc<dyn MediaBackend> = if cli.synthetic {
        warn!("Synthetic backend: the input is ignored and the output is raw RGB24");
        Arc::new(SyntheticBackend::default())
    } else {
        let ffmpeg = FfmpegBackend::new(config.encoder.clone());
        if !ffmpeg.is_available() {
            bail!("ffmpeg not found at '{}'; set encoder.ffmpeg_path or use --synthetic", config.encoder.ffmpeg_path);
        }
        Arc::new(ffmpeg)
    };

    let service = JobService::new(config, backend)?;
    let staged = service.stage_file(&cli.input).await?;
    let id = service.submit(staged, &cli.request()).await?;

    let mut last_progress = None;
    let snapshot = loop {
        let snapshot = service.get_job(id)?;
        if last_progress != Some(snapshot.progress) {
            info!("Job {}: {} {}%", id, snapshot.status, snapshot.progress);
            last_progress = Some(snapshot.progress);
        }
        if snapshot.status.is_terminal() {
            break snapshot;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    };

    if snapshot.status == JobStatus::Failed {
        let reason = snapshot.error.clone().unwrap_or_default();
        service.release_job(id)?;
        bail!("Job {} failed: {}", id, reason);
    }

    let produced = service.get_output_path(id)?;
    tokio::fs::copy(&produced, &cli.output).await?;
    service.release_job(id)?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    let mime = cli.format.parse::<OutputFormat>().map_or("application/octet-stream", |f| f.mime_type());
    info!("Done! Output saved to: {:?} ({})", cli.output, mime);
    Ok(())
}
