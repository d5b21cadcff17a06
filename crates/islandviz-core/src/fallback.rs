//! Procedural bar motion used when no live audio signal is available
//!
//! Heights are a pure function of track id, bar index, render time and
//! playback state, so the same track always animates the same way.

use crate::hash::Fnv1a;
use crate::state::PlaybackState;
use std::f32::consts::TAU;
use std::fmt::Write;

/// Base amplitude of the per-bar sinusoid
const PRIMARY_AMPLITUDE: f32 = 0.35;
/// Amplitude of the slow shared sinusoid
const SECONDARY_AMPLITUDE: f32 = 0.20;
/// Frequency of the slow shared sinusoid (Hz)
const SECONDARY_FREQ_HZ: f32 = 0.9;
/// Extra agitation while seeking
const SEEK_AMPLITUDE: f32 = 0.15;
/// Angular rate of the seeking term (rad/s)
const SEEK_RATE: f32 = 5.0;
/// Sample-and-hold noise refresh rate (Hz)
const NOISE_RATE_HZ: f32 = 12.0;
/// Sample-and-hold noise amplitude
const NOISE_AMPLITUDE: f32 = 0.12;
/// Lowest per-bar frequency (Hz)
const MIN_FREQ_HZ: f32 = 1.8;

/// Generator for fallback bar heights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackMotion {
    min_ratio: f32,
    max_ratio: f32,
}

impl FallbackMotion {
    /// Create a generator bounded to `[min_ratio, max_ratio]`
    pub fn new(min_ratio: f32, max_ratio: f32) -> Self {
        Self {
            min_ratio,
            max_ratio,
        }
    }

    /// Target height ratio for `bar` at `elapsed_secs`
    pub fn height(
        &self,
        bar: usize,
        track_id: &str,
        elapsed_secs: f64,
        state: PlaybackState,
    ) -> f32 {
        if !state.is_active() {
            return self.min_ratio;
        }

        let seed = bar_seed(track_id, bar);
        let phase = (seed % 1000) as f32 / 1000.0 * TAU;
        let freq = MIN_FREQ_HZ + (seed % 60) as f32 / 100.0;

        // f64 time keeps the phase precise over long sessions
        let t = elapsed_secs;
        let primary = (TAU as f64 * freq as f64 * t + phase as f64).sin() as f32;
        let secondary =
            (TAU as f64 * SECONDARY_FREQ_HZ as f64 * t + phase as f64 / 2.0).sin() as f32;

        let mut val = PRIMARY_AMPLITUDE * primary + SECONDARY_AMPLITUDE * secondary;

        if state == PlaybackState::Seeking {
            val += SEEK_AMPLITUDE * (SEEK_RATE as f64 * t + phase as f64).sin() as f32;
        }

        let window = (t * NOISE_RATE_HZ as f64).floor() as i64;
        let noise = noise_seed(track_id, bar, window);
        val += ((noise % 200) as f32 / 100.0 - 1.0) * NOISE_AMPLITUDE;

        (0.5 + val).clamp(self.min_ratio, self.max_ratio)
    }
}

/// `hash(track_id + bar)`
pub fn bar_seed(track_id: &str, bar: usize) -> u32 {
    let mut hasher = Fnv1a::new();
    hasher.write_str_chars(track_id);
    // Writing into Fnv1a cannot fail
    let _ = write!(hasher, "{bar}");
    hasher.finish()
}

/// `hash(track_id + bar + window)` for the sample-and-hold noise term
fn noise_seed(track_id: &str, bar: usize, window: i64) -> u32 {
    let mut hasher = Fnv1a::new();
    hasher.write_str_chars(track_id);
    let _ = write!(hasher, "{bar}:{window}");
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::fnv1a;

    #[test]
    fn test_idle_and_paused_are_flat() {
        let motion = FallbackMotion::new(0.15, 1.0);
        for t in [0.0, 0.3, 12.5] {
            assert_eq!(motion.height(0, "abc", t, PlaybackState::Idle), 0.15);
            assert_eq!(motion.height(3, "abc", t, PlaybackState::Paused), 0.15);
        }
    }

    #[test]
    fn test_bar_seed_matches_concatenation() {
        assert_eq!(bar_seed("abc", 0), fnv1a("abc0"));
        assert_eq!(bar_seed("abc", 12), fnv1a("abc12"));
    }

    #[test]
    fn test_playing_follows_formula() {
        let motion = FallbackMotion::new(0.0, 1.0);
        let t = 0.5;
        let seed = fnv1a("abc1");
        let phase = (seed % 1000) as f32 / 1000.0 * TAU;
        let freq = 1.8 + (seed % 60) as f32 / 100.0;
        let noise = noise_seed("abc", 1, 6);
        let expected = 0.5
            + 0.35 * (TAU * freq * t + phase).sin()
            + 0.20 * (TAU * 0.9 * t + phase / 2.0).sin()
            + ((noise % 200) as f32 / 100.0 - 1.0) * 0.12;
        let got = motion.height(1, "abc", t as f64, PlaybackState::Playing);
        assert!(
            (got - expected.clamp(0.0, 1.0)).abs() < 1e-4,
            "got {got}, expected {expected}"
        );
    }

    #[test]
    fn test_seeking_differs_from_playing() {
        let motion = FallbackMotion::new(0.0, 1.0);
        let differs = (0..50).any(|i| {
            let t = i as f64 * 0.07;
            let playing = motion.height(2, "xyz", t, PlaybackState::Playing);
            let seeking = motion.height(2, "xyz", t, PlaybackState::Seeking);
            (playing - seeking).abs() > 1e-3
        });
        assert!(differs);
    }

    /// Height with the two sinusoid terms removed: the base plus held noise
    fn held_part(motion: &FallbackMotion, bar: usize, track: &str, t: f64) -> f32 {
        let seed = bar_seed(track, bar);
        let phase = (seed % 1000) as f32 / 1000.0 * TAU;
        let freq = 1.8 + (seed % 60) as f32 / 100.0;
        let primary = (TAU as f64 * freq as f64 * t + phase as f64).sin() as f32;
        let secondary = (TAU as f64 * 0.9 * t + phase as f64 / 2.0).sin() as f32;
        motion.height(bar, track, t, PlaybackState::Playing) - 0.35 * primary - 0.20 * secondary
    }

    #[test]
    fn test_noise_holds_within_window() {
        // Wide bounds so clamping never hides the terms
        let motion = FallbackMotion::new(-10.0, 10.0);
        for bar in 0..5 {
            // 0.26 s and 0.32 s both fall in window 3 (0.25 .. 0.333 s)
            let early = held_part(&motion, bar, "abc", 0.26);
            let late = held_part(&motion, bar, "abc", 0.32);
            assert!((early - late).abs() < 1e-5, "bar {bar}: {early} vs {late}");
        }

        // Crossing into the next window draws new noise for some bar
        let changes = (0..5).any(|bar| {
            (held_part(&motion, bar, "abc", 0.32) - held_part(&motion, bar, "abc", 0.34)).abs()
                > 1e-3
        });
        assert!(changes);
    }
}
