//! islandviz - terminal demo of the island bar visualizer
//!
//! Plays a scripted media session against the engine and draws the bars on
//! stdout. Logs go to stderr (and optionally a file).

mod logging_setup;
mod terminal;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use islandviz_core::{
    AccentColor, HostInputs, PlaybackState, SystemClock, Visualizer, VisualizerConfig,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use terminal::TerminalRenderer;
use tracing::{info, warn};

/// Longest the loop blocks before re-checking the session script
const MAX_WAIT: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "islandviz")]
#[command(version)]
#[command(about = "Audio-reactive bar visualizer for a desktop island widget", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Playback state to report (idle, playing, paused, seeking)
    #[arg(short, long, default_value = "playing")]
    state: PlaybackState,

    /// Track identifier; an empty string means nothing is loaded
    #[arg(short, long, default_value = "demo-track")]
    track: String,

    /// Accent color as #rrggbb or #rrggbbaa
    #[arg(short, long, default_value = "#ff8a00")]
    accent: String,

    /// How long to run (seconds)
    #[arg(long, default_value = "10.0")]
    seconds: f64,

    /// Switch to paused after this many seconds
    #[arg(long)]
    pause_after: Option<f64>,

    /// Capture device name (defaults to the system output)
    #[arg(short, long)]
    device: Option<String>,

    /// Never open an audio device; show fallback motion only
    #[arg(long)]
    no_capture: bool,

    /// List capture devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short = 'L', long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => VisualizerConfig::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => VisualizerConfig::default(),
    };
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }

    let _log_guard = logging_setup::init(&config.log)?;

    if cli.list_devices {
        return list_devices();
    }

    let accent = AccentColor::from_hex(&cli.accent)
        .ok_or_else(|| anyhow!("invalid accent color: {}", cli.accent))?;
    let run_for = run_duration(cli.seconds)?;

    let clock = SystemClock::new();
    let mut viz = build_visualizer(&cli, config, clock.clone())?;
    let mut renderer = TerminalRenderer::stdout();

    info!(
        "Session: {} '{}' for {:.1}s",
        cli.state, cli.track, cli.seconds
    );

    let mut inputs = HostInputs {
        state: cli.state,
        track_id: cli.track.clone(),
        visible: true,
        accent,
    };
    viz.update(inputs.clone());

    let started = Instant::now();
    let mut frames = 0u64;

    while started.elapsed() < run_for {
        if let Some(after) = cli.pause_after {
            if inputs.state != PlaybackState::Paused && started.elapsed().as_secs_f64() >= after {
                inputs.state = PlaybackState::Paused;
                viz.update(inputs.clone());
            }
        }

        if clock.wait_for_tick(MAX_WAIT) && viz.tick_and_render(&mut renderer) {
            frames += 1;
        }
    }

    renderer.finish()?;
    match viz.capture_stats() {
        Some(stats) => info!(
            "Rendered {} frames; capture: {} sessions, {} spectra, {} failures",
            frames, stats.sessions_started, stats.spectra, stats.failures
        ),
        None => info!("Rendered {} frames (capture disabled)", frames),
    }
    Ok(())
}

/// `--seconds` as a duration; must be finite and not negative
fn run_duration(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("--seconds must be a finite, non-negative number, got {seconds}"))
}

fn build_visualizer(
    cli: &Cli,
    config: VisualizerConfig,
    clock: SystemClock,
) -> Result<Visualizer<SystemClock>> {
    if cli.no_capture {
        return Ok(Visualizer::without_capture(config, clock)?);
    }

    #[cfg(feature = "audio")]
    {
        use islandviz_core::audio::backend::cpal_backend::CpalLoopbackBackend;

        let device = cli.device.clone();
        Ok(Visualizer::with_backend(config, clock, move || {
            CpalLoopbackBackend::new(device)
        })?)
    }

    #[cfg(not(feature = "audio"))]
    {
        if cli.device.is_some() {
            warn!("Built without audio support; ignoring --device");
        }
        Ok(Visualizer::new(config, clock)?)
    }
}

#[cfg(feature = "audio")]
fn list_devices() -> Result<()> {
    use islandviz_core::audio::backend::cpal_backend::CpalLoopbackBackend;

    let devices = CpalLoopbackBackend::list_devices()?;
    if devices.is_empty() {
        warn!("No audio devices found");
    }
    for name in devices {
        println!("{name}");
    }
    Ok(())
}

#[cfg(not(feature = "audio"))]
fn list_devices() -> Result<()> {
    warn!("Built without audio support; no devices to list");
    Ok(())
}
