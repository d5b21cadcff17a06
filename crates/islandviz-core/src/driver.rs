//! Animation driver - per-tick bar and opacity state machine
//!
//! Runs on the render thread. Each tick it picks a target height per bar
//! (live band level or fallback motion), eases the visible height toward it
//! with separate rise and fall time constants, eases opacity toward the
//! state's target, and works out whether audio capture should be running and
//! how soon the next tick is needed.

use crate::config::{ConfigError, VisualizerConfig};
use crate::fallback::FallbackMotion;
use crate::state::PlaybackState;
use std::time::Duration;
use tracing::debug;

/// Longest step the smoothing will integrate in one tick (seconds).
/// Render time itself always advances by the full tick interval.
const MAX_SMOOTHING_DT: f64 = 0.25;

/// Distance from target below which Idle counts as settled
const SETTLE_EPSILON: f32 = 1e-3;

/// What capture should do after a state change or tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureDirective {
    /// Open the loopback device
    Start,
    /// Close the loopback device
    Stop,
}

/// Where this tick's bar targets came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetSource {
    /// Live band levels from capture
    Live,
    /// Procedural fallback motion
    #[default]
    Fallback,
}

/// Per-bar render state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarVisualState {
    /// Displayed height ratio
    pub current: f32,
    /// Target used on the most recent tick
    pub last_target: f32,
}

/// Result of one [`AnimationDriver::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// Whether visual state advanced (false while the clock warms up)
    pub advanced: bool,
    /// Capture change requested by this tick
    pub directive: Option<CaptureDirective>,
}

/// Bar animation state machine
#[derive(Debug, Clone)]
pub struct AnimationDriver {
    min_ratio: f32,
    max_ratio: f32,
    noise_floor: f32,
    opacity_tau_ms: f32,
    attack_tau_ms: f32,
    decay_tau_ms: f32,
    playing_interval: Duration,
    paused_interval: Duration,
    paused_grace_secs: f64,

    motion: FallbackMotion,
    bars: Vec<BarVisualState>,
    heights: Vec<f32>,
    opacity: f32,

    state: PlaybackState,
    track_id: String,
    visible: bool,

    elapsed: f64,
    last_tick: Option<f64>,
    paused_at: Option<f64>,
    capture_wanted: bool,
    suspended: bool,
    source: TargetSource,
}

impl AnimationDriver {
    /// Driver at rest: Idle, hidden, bars at the minimum.
    ///
    /// Fails if `config` does not pass [`VisualizerConfig::validate`].
    pub fn new(config: &VisualizerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let bars = vec![
            BarVisualState {
                current: config.min_ratio,
                last_target: config.min_ratio,
            };
            config.bar_count
        ];
        Ok(Self {
            min_ratio: config.min_ratio,
            max_ratio: config.max_ratio,
            noise_floor: config.noise_floor,
            opacity_tau_ms: config.opacity_tau_ms,
            attack_tau_ms: config.attack_tau_ms,
            decay_tau_ms: config.decay_tau_ms,
            playing_interval: config.playing_tick_interval(),
            paused_interval: config.paused_tick_interval(),
            paused_grace_secs: config.paused_capture_grace_secs,
            motion: FallbackMotion::new(config.min_ratio, config.max_ratio),
            heights: vec![config.min_ratio; config.bar_count],
            bars,
            opacity: PlaybackState::Idle.target_opacity(),
            state: PlaybackState::Idle,
            track_id: String::new(),
            visible: false,
            elapsed: 0.0,
            last_tick: None,
            paused_at: None,
            capture_wanted: false,
            suspended: true,
            source: TargetSource::Fallback,
        })
    }

    /// Apply new host inputs at clock time `now`.
    ///
    /// `capture_active` tells whether audio is flowing right now; entering
    /// Playing without it asks for a (re)start.
    pub fn set_inputs(
        &mut self,
        state: PlaybackState,
        track_id: &str,
        visible: bool,
        capture_active: bool,
        now: f64,
    ) -> Option<CaptureDirective> {
        let previous = self.state;
        if state != previous {
            debug!("Playback state {} -> {}", previous, state);
        }

        self.state = state;
        self.visible = visible;
        if self.track_id != track_id {
            self.track_id.clear();
            self.track_id.push_str(track_id);
        }

        self.paused_at = match (state, self.paused_at) {
            (PlaybackState::Paused, Some(at)) => Some(at),
            (PlaybackState::Paused, None) => Some(now),
            _ => None,
        };

        let entering_playing = state == PlaybackState::Playing && previous != state;
        let directive = self.update_capture(now);
        if directive.is_none() && entering_playing && visible && !capture_active {
            return Some(CaptureDirective::Start);
        }
        directive
    }

    /// Advance one render tick at clock time `now` using the latest band
    /// levels. `live` says whether those levels come from a running capture.
    pub fn tick(&mut self, now: f64, levels: &[f32], live: bool) -> TickOutcome {
        let directive = self.update_capture(now);

        let Some(last) = self.last_tick else {
            self.last_tick = Some(now);
            return TickOutcome {
                advanced: false,
                directive,
            };
        };

        let dt = now - last;
        if dt.is_nan() || dt <= 0.0 {
            return TickOutcome {
                advanced: false,
                directive,
            };
        }
        self.last_tick = Some(now);
        self.elapsed += dt;

        self.source = if self.state == PlaybackState::Playing
            && live
            && levels.iter().any(|&l| l > self.noise_floor)
        {
            TargetSource::Live
        } else {
            TargetSource::Fallback
        };

        let dt_ms = (dt.min(MAX_SMOOTHING_DT) * 1000.0) as f32;
        let span = self.max_ratio - self.min_ratio;

        for (i, bar) in self.bars.iter_mut().enumerate() {
            let target = match self.source {
                TargetSource::Live => {
                    let level = levels.get(i).copied().unwrap_or(0.0);
                    let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
                    self.min_ratio + level * span
                }
                TargetSource::Fallback => {
                    self.motion
                        .height(i, &self.track_id, self.elapsed, self.state)
                }
            };

            let tau = if target > bar.current {
                self.attack_tau_ms
            } else {
                self.decay_tau_ms
            };
            bar.current = smooth_toward(bar.current, target, dt_ms, tau)
                .clamp(self.min_ratio, self.max_ratio);
            bar.last_target = target;
            self.heights[i] = bar.current;
        }

        let opacity_target = self.state.target_opacity();
        self.opacity =
            smooth_toward(self.opacity, opacity_target, dt_ms, self.opacity_tau_ms).clamp(0.0, 1.0);

        if self.state == PlaybackState::Idle && self.is_settled() {
            self.snap_to_targets();
        }

        TickOutcome {
            advanced: true,
            directive,
        }
    }

    /// Delay until the next tick, or `None` when ticking should stop
    pub fn schedule(&mut self) -> Option<Duration> {
        let next = if !self.visible {
            None
        } else {
            match self.state {
                PlaybackState::Playing | PlaybackState::Seeking => Some(self.playing_interval),
                PlaybackState::Paused => Some(self.paused_interval),
                PlaybackState::Idle if self.is_settled() => None,
                PlaybackState::Idle => Some(self.paused_interval),
            }
        };

        match (self.suspended, next.is_some()) {
            (false, false) => {
                debug!("Render tick suspended");
                self.suspended = true;
            }
            (true, true) => {
                // Time spent suspended must not count as one giant step
                self.last_tick = None;
                self.suspended = false;
            }
            _ => {}
        }
        next
    }

    /// Work out whether capture should run and report a change
    fn update_capture(&mut self, now: f64) -> Option<CaptureDirective> {
        let wanted = if !self.visible {
            false
        } else {
            match self.state {
                PlaybackState::Idle => false,
                PlaybackState::Playing => true,
                PlaybackState::Seeking => self.capture_wanted,
                PlaybackState::Paused => {
                    let paused_for = self.paused_at.map_or(0.0, |at| now - at);
                    self.capture_wanted && paused_for < self.paused_grace_secs
                }
            }
        };

        if wanted == self.capture_wanted {
            return None;
        }
        self.capture_wanted = wanted;
        Some(if wanted {
            CaptureDirective::Start
        } else {
            CaptureDirective::Stop
        })
    }

    /// Whether Idle heights and opacity have reached their targets
    fn is_settled(&self) -> bool {
        let target = self.state.target_opacity();
        (self.opacity - target).abs() < SETTLE_EPSILON
            && self
                .bars
                .iter()
                .all(|bar| (bar.current - bar.last_target).abs() < SETTLE_EPSILON)
    }

    fn snap_to_targets(&mut self) {
        for (bar, height) in self.bars.iter_mut().zip(self.heights.iter_mut()) {
            bar.current = bar.last_target;
            *height = bar.current;
        }
        self.opacity = self.state.target_opacity();
    }

    /// Displayed bar heights
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    /// Per-bar state
    pub fn bars(&self) -> &[BarVisualState] {
        &self.bars
    }

    /// Displayed opacity
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Current playback state
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Render time accumulated over advanced ticks (seconds)
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Whether the driver currently wants capture running
    pub fn capture_wanted(&self) -> bool {
        self.capture_wanted
    }

    /// Target source of the most recent tick
    pub fn target_source(&self) -> TargetSource {
        self.source
    }

    /// Lowest bar ratio
    pub fn min_ratio(&self) -> f32 {
        self.min_ratio
    }

    /// Highest bar ratio
    pub fn max_ratio(&self) -> f32 {
        self.max_ratio
    }
}

/// `current + (target - current) * (1 - e^(-dt/tau))`
pub fn smooth_toward(current: f32, target: f32, dt_ms: f32, tau_ms: f32) -> f32 {
    let alpha = 1.0 - (-dt_ms / tau_ms).exp();
    current + (target - current) * alpha
}
