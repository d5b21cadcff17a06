//! Audio capture and spectral analysis
//!
//! Everything in this module except [`envelope::SharedBandLevels`] runs on the
//! capture side of the pipeline:
//!
//! - **backend**: device I/O behind the [`backend::CaptureBackend`] trait
//! - **capture**: the capture worker thread and session lifecycle
//! - **analyzer**: windowing, FFT and band reduction
//! - **envelope**: attack/decay smoothing and the render-side handoff

pub mod analyzer;
pub mod backend;
pub mod capture;
pub mod envelope;

pub use analyzer::SpectralAnalyzer;
pub use capture::{CaptureError, CaptureSession, CaptureStats, LoopbackCapture, Started};
pub use envelope::{BandEnvelopeFollower, LevelSnapshot, SharedBandLevels};

use crate::config::VisualizerConfig;

/// Upper edge of the analyzed spectrum (Hz)
const TOP_FREQ_HZ: f32 = 16_000.0;

/// One block of interleaved PCM as delivered by the device callback
#[derive(Debug, Clone, Copy)]
pub struct AudioFrameBatch<'a> {
    /// Interleaved samples in [-1, 1]
    pub samples: &'a [f32],
    /// Channels per frame
    pub channels: u16,
    /// Frames per second
    pub sample_rate: u32,
}

impl<'a> AudioFrameBatch<'a> {
    /// Wrap a callback buffer
    pub fn new(samples: &'a [f32], channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Number of complete frames in the batch
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Mono samples, averaging each frame's channels.
    ///
    /// Non-finite samples count as silence. A trailing partial frame is
    /// dropped, and a zero channel count yields nothing.
    pub fn mono(&self) -> impl Iterator<Item = f32> + 'a {
        let channels = self.channels.max(1) as usize;
        let frames = self.frame_count();
        let scale = 1.0 / channels as f32;
        self.samples
            .chunks_exact(channels)
            .take(frames)
            .map(move |frame| {
                frame
                    .iter()
                    .map(|&s| if s.is_finite() { s } else { 0.0 })
                    .sum::<f32>()
                    * scale
            })
    }
}

/// FFT bin range and EQ weight feeding one bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandDescriptor {
    /// First bin (inclusive)
    pub start_bin: usize,
    /// Last bin (exclusive)
    pub end_bin: usize,
    /// Gain applied to the band's dB value
    pub eq_weight: f32,
}

/// Immutable set of bands, bass first
#[derive(Debug, Clone, PartialEq)]
pub struct BandLayout {
    bands: Vec<BandDescriptor>,
}

impl BandLayout {
    /// Build a layout from explicit descriptors
    pub fn new(bands: Vec<BandDescriptor>) -> Self {
        Self { bands }
    }

    /// Log-spaced bands from bin 1 up to ~16 kHz, EQ weight `1 + i/2`
    pub fn log_spaced(bar_count: usize, window_size: usize, sample_rate: u32) -> Self {
        let half = (window_size / 2).max(2);
        let bin_hz = sample_rate as f32 / window_size as f32;
        let top_bin = ((TOP_FREQ_HZ / bin_hz) as usize)
            .min(half)
            .max(bar_count + 1);

        let first = 1.0f32;
        let ratio = (top_bin as f32 / first).powf(1.0 / bar_count.max(1) as f32);

        let mut bands = Vec::with_capacity(bar_count);
        let mut start = 1usize;
        for i in 0..bar_count {
            let edge = (first * ratio.powi(i as i32 + 1)).round() as usize;
            // Every band needs at least one bin
            let end = if i + 1 == bar_count {
                top_bin
            } else {
                edge.max(start + 1).min(top_bin - (bar_count - 1 - i))
            };
            bands.push(BandDescriptor {
                start_bin: start,
                end_bin: end,
                eq_weight: 1.0 + i as f32 * 0.5,
            });
            start = end;
        }
        Self { bands }
    }

    /// Layout for the configured bar count, window and sample rate
    pub fn for_config(config: &VisualizerConfig) -> Self {
        Self::log_spaced(
            config.bar_count,
            config.window_size,
            config.sample_rate_hint,
        )
    }

    /// Bands in bar order
    pub fn bands(&self) -> &[BandDescriptor] {
        &self.bands
    }

    /// Number of bands
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    /// Whether the layout has no bands
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}
