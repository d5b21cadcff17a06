//! islandviz Core - Audio-Reactive Bar Visualizer
//!
//! This crate contains the visualizer pipeline behind the island widget:
//! - Loopback capture on a dedicated worker thread
//! - Spectral analysis (Hamming window, FFT, peak-per-band, dB scaling)
//! - Envelope following and the capture-to-render handoff
//! - Per-tick bar animation with procedural fallback motion
//!
//! Window chrome, media-session detection and drawing belong to the host;
//! it feeds [`HostInputs`] in and draws [`RenderFrame`]s out.

#![warn(missing_docs)]

use thiserror::Error;

pub mod audio;
pub mod clock;
pub mod config;
pub mod driver;
pub mod engine;
pub mod fallback;
pub mod hash;
pub mod logging;
pub mod render;
pub mod state;

// --- Re-exports grouped by category ---

// Audio pipeline
pub use audio::backend::{CaptureBackend, NullBackend};
pub use audio::{
    AudioFrameBatch, BandDescriptor, BandEnvelopeFollower, BandLayout, CaptureError, CaptureStats,
    LoopbackCapture, SharedBandLevels, SpectralAnalyzer, Started,
};

// Animation
pub use driver::{AnimationDriver, BarVisualState, CaptureDirective, TargetSource};
pub use fallback::FallbackMotion;
pub use hash::fnv1a;

// Engine & host boundary
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::Visualizer;
pub use render::{RenderFrame, Renderer};
pub use state::{AccentColor, HostInputs, PlaybackState};

// Configuration & logging
pub use config::{ConfigError, VisualizerConfig};
pub use logging::LogConfig;

/// Core error types
#[derive(Error, Debug)]
pub enum VizError {
    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Audio capture failed
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, VizError>;
