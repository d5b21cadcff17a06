//! Band envelope follower and the capture-to-render handoff
//!
//! The follower applies peak-meter ballistics (fast attack, slow decay) on
//! the capture thread. Results cross to the render thread through
//! [`SharedBandLevels`], a single mutex held only while copying.

use parking_lot::Mutex;
use std::sync::Arc;

/// Weight kept from the previous value while rising
const ATTACK_KEEP: f32 = 0.4;
/// Weight kept from the previous value while falling
const DECAY_KEEP: f32 = 0.85;

/// Asymmetric exponential smoother, one value per band
#[derive(Debug, Clone)]
pub struct BandEnvelopeFollower {
    current: Vec<f32>,
}

impl BandEnvelopeFollower {
    /// Follower for `bands` bands, all at zero
    pub fn new(bands: usize) -> Self {
        Self {
            current: vec![0.0; bands],
        }
    }

    /// Blend a fresh spectrum into the envelope and return the result
    pub fn apply(&mut self, levels: &[f32]) -> &[f32] {
        for (current, &level) in self.current.iter_mut().zip(levels) {
            let level = sanitize(level);
            let keep = if level > *current {
                ATTACK_KEEP
            } else {
                DECAY_KEEP
            };
            *current = sanitize(*current * keep + level * (1.0 - keep));
        }
        &self.current
    }

    /// Current envelope values
    pub fn levels(&self) -> &[f32] {
        &self.current
    }

    /// Drop back to silence
    pub fn reset(&mut self) {
        self.current.fill(0.0);
    }
}

/// Clamp to [0, 1], mapping NaN to 0
fn sanitize(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug)]
struct BandLevelState {
    levels: Vec<f32>,
    active: bool,
    generation: u64,
}

/// What the render side learned from one copy-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LevelSnapshot {
    /// A capture session is delivering audio
    pub active: bool,
    /// Number of spectra published so far
    pub generation: u64,
}

/// Band levels shared between the capture thread and the render thread.
///
/// Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct SharedBandLevels {
    inner: Arc<Mutex<BandLevelState>>,
}

impl SharedBandLevels {
    /// Shared state for `bands` bands, inactive and silent
    pub fn new(bands: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BandLevelState {
                levels: vec![0.0; bands],
                active: false,
                generation: 0,
            })),
        }
    }

    /// Copy in a new set of levels (capture side)
    pub fn publish(&self, levels: &[f32]) {
        let mut state = self.inner.lock();
        for (dst, &src) in state.levels.iter_mut().zip(levels) {
            *dst = sanitize(src);
        }
        state.generation += 1;
    }

    /// Mark capture as running or stopped; stopping silences every band
    pub fn set_active(&self, active: bool) {
        let mut state = self.inner.lock();
        state.active = active;
        if !active {
            state.levels.fill(0.0);
        }
    }

    /// Whether a capture session is delivering audio
    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    /// Copy the levels out into `out` (render side)
    pub fn snapshot_into(&self, out: &mut [f32]) -> LevelSnapshot {
        let state = self.inner.lock();
        for (dst, &src) in out.iter_mut().zip(&state.levels) {
            *dst = src;
        }
        LevelSnapshot {
            active: state.active,
            generation: state.generation,
        }
    }

    /// Number of bands
    pub fn len(&self) -> usize {
        self.inner.lock().levels.len()
    }

    /// Whether there are no bands
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
