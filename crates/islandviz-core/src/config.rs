//! Visualizer configuration
//!
//! Every tunable constant of the pipeline lives here so hosts can adjust the
//! feel of the bars without recompiling. Loaded from TOML; missing keys take
//! their defaults.

use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Bar counts the band layout supports
pub const SUPPORTED_BAR_COUNTS: std::ops::RangeInclusive<usize> = 3..=8;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the visualizer engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    /// Number of bars (and frequency bands)
    pub bar_count: usize,
    /// Lowest bar height as a ratio of the total height
    pub min_ratio: f32,
    /// Highest bar height as a ratio of the total height
    pub max_ratio: f32,
    /// dB value that maps to a full-height band before EQ weighting
    pub reference_db: f32,
    /// Band level above which live audio drives the bars
    pub noise_floor: f32,
    /// Opacity smoothing time constant (ms)
    pub opacity_tau_ms: f32,
    /// Height smoothing time constant while rising (ms)
    pub attack_tau_ms: f32,
    /// Height smoothing time constant while falling (ms)
    pub decay_tau_ms: f32,
    /// Render tick rate while playing or seeking
    pub playing_tick_hz: f32,
    /// Render tick rate while paused
    pub paused_tick_hz: f32,
    /// How long capture stays warm after pausing (seconds)
    pub paused_capture_grace_secs: f64,
    /// Analysis window length in samples (power of two)
    pub window_size: usize,
    /// Expected device sample rate, used to lay out band bins
    pub sample_rate_hint: u32,
    /// Logging configuration
    pub log: LogConfig,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            bar_count: 5,
            min_ratio: 0.15,
            max_ratio: 1.0,
            reference_db: 20.0,
            noise_floor: 0.05,
            opacity_tau_ms: 200.0,
            attack_tau_ms: 60.0,
            decay_tau_ms: 240.0,
            playing_tick_hz: 60.0,
            paused_tick_hz: 8.0,
            paused_capture_grace_secs: 5.0,
            window_size: 1024,
            sample_rate_hint: 48_000,
            log: LogConfig::default(),
        }
    }
}

impl VisualizerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: VisualizerConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_BAR_COUNTS.contains(&self.bar_count) {
            return Err(ConfigError::Invalid(format!(
                "bar_count must be in {}..={}, got {}",
                SUPPORTED_BAR_COUNTS.start(),
                SUPPORTED_BAR_COUNTS.end(),
                self.bar_count
            )));
        }
        let ratios_ok = (0.0..=1.0).contains(&self.min_ratio)
            && (0.0..=1.0).contains(&self.max_ratio)
            && self.min_ratio < self.max_ratio;
        if !ratios_ok {
            return Err(ConfigError::Invalid(format!(
                "need 0 <= min_ratio < max_ratio <= 1, got {}..{}",
                self.min_ratio, self.max_ratio
            )));
        }
        if !(self.reference_db > 0.0 && self.reference_db.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "reference_db must be positive, got {}",
                self.reference_db
            )));
        }
        if !(0.0..1.0).contains(&self.noise_floor) {
            return Err(ConfigError::Invalid(format!(
                "noise_floor must be in [0, 1), got {}",
                self.noise_floor
            )));
        }
        for (name, tau) in [
            ("opacity_tau_ms", self.opacity_tau_ms),
            ("attack_tau_ms", self.attack_tau_ms),
            ("decay_tau_ms", self.decay_tau_ms),
        ] {
            if !(tau > 0.0 && tau.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be positive, got {tau}"
                )));
            }
        }
        if !(self.playing_tick_hz > 0.0 && self.playing_tick_hz <= 240.0) {
            return Err(ConfigError::Invalid(format!(
                "playing_tick_hz must be in (0, 240], got {}",
                self.playing_tick_hz
            )));
        }
        if !(self.paused_tick_hz > 0.0 && self.paused_tick_hz <= 10.0) {
            return Err(ConfigError::Invalid(format!(
                "paused_tick_hz must be in (0, 10], got {}",
                self.paused_tick_hz
            )));
        }
        if self.paused_capture_grace_secs.is_nan() || self.paused_capture_grace_secs < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "paused_capture_grace_secs must be >= 0, got {}",
                self.paused_capture_grace_secs
            )));
        }
        if self.window_size < 64 || !self.window_size.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "window_size must be a power of two >= 64, got {}",
                self.window_size
            )));
        }
        if self.sample_rate_hint == 0 {
            return Err(ConfigError::Invalid("sample_rate_hint must be > 0".into()));
        }
        Ok(())
    }

    /// Interval between render ticks while playing or seeking
    pub fn playing_tick_interval(&self) -> Duration {
        tick_interval(self.playing_tick_hz)
    }

    /// Interval between render ticks while paused or settling
    pub fn paused_tick_interval(&self) -> Duration {
        tick_interval(self.paused_tick_hz)
    }
}

/// `1 / hz` as a duration; rates that give no finite interval saturate
fn tick_interval(hz: f32) -> Duration {
    Duration::try_from_secs_f32(1.0 / hz).unwrap_or(Duration::MAX)
}
