//! Spectral analyzer - windowed FFT reduced to a handful of bar bands
//!
//! Mono samples accumulate into a fixed window. When the window is full it is
//! Hamming-weighted, transformed, reduced to one level per band and cleared.
//! Windows do not overlap.

use super::{AudioFrameBatch, BandLayout};
use crate::config::VisualizerConfig;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;
use tracing::{debug, trace};

/// Spectral analyzer owned by the capture thread
pub struct SpectralAnalyzer {
    /// FFT instance
    fft: Arc<dyn Fft<f32>>,

    /// Window length (power of two)
    window_size: usize,

    /// Hamming window coefficients
    window: Vec<f32>,

    /// Mono samples collected since the last spectrum
    accumulation: Vec<f32>,

    /// FFT complex buffer
    fft_buffer: Vec<Complex<f32>>,

    /// FFT scratch buffer
    scratch_buffer: Vec<Complex<f32>>,

    /// Bin ranges per bar
    layout: BandLayout,

    /// dB value mapped to a full band before EQ
    reference_db: f32,

    /// Per-band levels of the most recent spectrum
    levels: Vec<f32>,

    /// Number of spectra computed
    spectrum_count: u64,
}

impl SpectralAnalyzer {
    /// Create an analyzer.
    ///
    /// `window_size` must be a power of two; [`VisualizerConfig::validate`]
    /// enforces this for configured analyzers.
    pub fn new(window_size: usize, layout: BandLayout, reference_db: f32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(window_size);

        let levels = vec![0.0; layout.len()];

        debug!(
            "SpectralAnalyzer created: window_size={}, bands={}, reference_db={}",
            window_size,
            layout.len(),
            reference_db
        );

        Self {
            fft,
            window_size,
            window: hamming_window(window_size),
            accumulation: Vec::with_capacity(window_size),
            fft_buffer: vec![Complex::new(0.0, 0.0); window_size],
            scratch_buffer: vec![Complex::new(0.0, 0.0); window_size],
            layout,
            reference_db,
            levels,
            spectrum_count: 0,
        }
    }

    /// Create an analyzer from configuration
    pub fn from_config(config: &VisualizerConfig) -> Self {
        Self::new(
            config.window_size,
            BandLayout::for_config(config),
            config.reference_db,
        )
    }

    /// Downmix a batch and feed it in.
    ///
    /// `on_spectrum` runs once per completed window with the band levels.
    /// Returns the number of spectra computed.
    pub fn process_batch<F>(&mut self, batch: &AudioFrameBatch<'_>, on_spectrum: F) -> usize
    where
        F: FnMut(&[f32]),
    {
        self.process_mono(batch.mono(), on_spectrum)
    }

    /// Feed mono samples.
    ///
    /// Samples are hard-clipped to [-1, 1] so clipping input saturates the
    /// bands instead of overflowing the transform.
    pub fn process_mono<I, F>(&mut self, samples: I, mut on_spectrum: F) -> usize
    where
        I: IntoIterator<Item = f32>,
        F: FnMut(&[f32]),
    {
        let mut computed = 0;
        for sample in samples {
            let sample = if sample.is_finite() {
                sample.clamp(-1.0, 1.0)
            } else {
                0.0
            };
            self.accumulation.push(sample);

            if self.accumulation.len() == self.window_size {
                self.analyze();
                self.accumulation.clear();
                on_spectrum(&self.levels);
                computed += 1;
            }
        }
        computed
    }

    /// Transform the full window and reduce it to band levels
    fn analyze(&mut self) {
        self.spectrum_count += 1;

        for (i, (&sample, coeff)) in self.accumulation.iter().zip(&self.window).enumerate() {
            self.fft_buffer[i] = Complex::new(sample * coeff, 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch_buffer);

        // Only the first half is meaningful for real input
        let half = self.window_size / 2;
        let spectrum = &self.fft_buffer[..half];

        for (level, band) in self.levels.iter_mut().zip(self.layout.bands()) {
            let start = band.start_bin.min(half);
            let end = band.end_bin.min(half).max(start);

            // Peak, not mean: a narrow loud partial should light the bar
            let peak = spectrum[start..end]
                .iter()
                .map(|bin| bin.norm())
                .fold(0.0f32, f32::max);

            *level = band_level(peak, band.eq_weight, self.reference_db);
        }

        if self.spectrum_count % 100 == 0 {
            trace!("Spectrum #{}: levels={:?}", self.spectrum_count, self.levels);
        }
    }

    /// Levels of the most recent spectrum
    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    /// Samples waiting for the window to fill
    pub fn buffered(&self) -> usize {
        self.accumulation.len()
    }

    /// Number of spectra computed so far
    pub fn spectrum_count(&self) -> u64 {
        self.spectrum_count
    }

    /// Window length in samples
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Drop buffered samples and zero the levels
    pub fn reset(&mut self) {
        self.accumulation.clear();
        self.levels.fill(0.0);
        self.spectrum_count = 0;
        debug!("SpectralAnalyzer reset");
    }
}

/// Hamming window: `0.54 - 0.46 cos(2 pi i / (N - 1))`
pub fn hamming_window(size: usize) -> Vec<f32> {
    let denom = size.saturating_sub(1).max(1) as f32;
    (0..size)
        .map(|i| 0.54 - 0.46 * (2.0 * std::f32::consts::PI * i as f32 / denom).cos())
        .collect()
}

/// Map a peak magnitude to a normalized band level in [0, 1]
pub fn band_level(peak_magnitude: f32, eq_weight: f32, reference_db: f32) -> f32 {
    // +1 keeps log10 away from zero
    let db = 10.0 * (peak_magnitude.max(0.0) + 1.0).log10();
    let level = db * eq_weight / reference_db;
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn default_analyzer() -> SpectralAnalyzer {
        SpectralAnalyzer::from_config(&VisualizerConfig::default())
    }

    fn sine(freq: f32, sample_rate: f32, amplitude: f32, count: usize) -> Vec<f32> {
        (0..count)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin() * amplitude)
            .collect()
    }

    #[test]
    fn test_hamming_endpoints() {
        let window = hamming_window(1024);
        assert!((window[0] - 0.08).abs() < 1e-6);
        assert!((window[1023] - 0.08).abs() < 1e-5);
        let peak = window.iter().cloned().fold(0.0f32, f32::max);
        assert!((peak - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_silence_yields_zero_levels() {
        let mut analyzer = default_analyzer();
        let silence = vec![0.0f32; 1024];
        let mut seen = Vec::new();
        let computed = analyzer.process_mono(silence, |levels| seen = levels.to_vec());

        assert_eq!(computed, 1);
        assert_eq!(seen.len(), 5);
        for level in seen {
            assert_eq!(level, 0.0);
        }
    }

    #[test]
    fn test_window_is_consumed_and_reset() {
        let mut analyzer = default_analyzer();
        let computed = analyzer.process_mono(vec![0.1f32; 1000], |_| {});
        assert_eq!(computed, 0);
        assert_eq!(analyzer.buffered(), 1000);

        let computed = analyzer.process_mono(vec![0.1f32; 1100], |_| {});
        assert_eq!(computed, 2);
        assert_eq!(analyzer.buffered(), 2100 - 2048);
    }

    #[test]
    fn test_clipping_input_saturates() {
        let mut analyzer = default_analyzer();
        let loud: Vec<f32> = sine(200.0, 48_000.0, 1e30, 1024);
        analyzer.process_mono(loud, |_| {});
        for &level in analyzer.levels() {
            assert!(level.is_finite());
            assert!((0.0..=1.0).contains(&level));
        }
        assert_eq!(analyzer.levels()[1], 1.0);
    }

    #[test]
    fn test_bass_tone_lights_bass_band() {
        let mut analyzer = default_analyzer();
        // ~94 Hz sits in bins 1..3 at 48 kHz / 1024
        let tone = sine(94.0, 48_000.0, 0.5, 1024);
        analyzer.process_mono(tone, |_| {});
        let levels = analyzer.levels();
        assert!(levels[0] > 0.5, "bass level was {}", levels[0]);
        assert!(
            levels[0] > levels[3] * 2.0,
            "bass should dominate mids: {levels:?}"
        );
    }

    #[test]
    fn test_stereo_batch_is_downmixed() {
        let mut analyzer = default_analyzer();
        // Opposite channels cancel to silence
        let interleaved: Vec<f32> = (0..2048)
            .map(|i| if i % 2 == 0 { 0.8 } else { -0.8 })
            .collect();
        let batch = AudioFrameBatch::new(&interleaved, 2, 48_000);
        let computed = analyzer.process_batch(&batch, |_| {});
        assert_eq!(computed, 1);
        assert!(analyzer.levels().iter().all(|&l| l == 0.0));
    }

    #[test]
    fn test_band_level_math() {
        // 10*log10(99 + 1) = 20 dB -> exactly the reference
        assert!((band_level(99.0, 1.0, 20.0) - 1.0).abs() < 1e-6);
        assert!((band_level(9.0, 1.0, 20.0) - 0.5).abs() < 1e-6);
        assert!((band_level(9.0, 1.5, 20.0) - 0.75).abs() < 1e-6);
        assert_eq!(band_level(0.0, 3.0, 20.0), 0.0);
        assert_eq!(band_level(f32::INFINITY, 1.0, 20.0), 1.0);
        assert_eq!(band_level(f32::NAN, 1.0, 20.0), 0.0);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut analyzer = default_analyzer();
        analyzer.process_mono(sine(440.0, 48_000.0, 0.5, 1500), |_| {});
        assert!(analyzer.levels().iter().any(|&l| l > 0.0));
        analyzer.reset();
        assert_eq!(analyzer.buffered(), 0);
        assert!(analyzer.levels().iter().all(|&l| l == 0.0));
        assert_eq!(analyzer.spectrum_count(), 0);
    }
}
