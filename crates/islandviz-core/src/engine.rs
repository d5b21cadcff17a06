//! Visualizer engine - the host-facing entry point
//!
//! Owns the capture worker, the shared band levels, the animation driver and
//! the render clock. The host calls [`Visualizer::update`] whenever its media
//! state changes and [`Visualizer::tick`] whenever the clock says a tick is
//! due.

use crate::audio::backend::{self, CaptureBackend};
use crate::audio::{CaptureStats, LoopbackCapture, SharedBandLevels};
use crate::clock::Clock;
use crate::config::VisualizerConfig;
use crate::driver::{AnimationDriver, CaptureDirective, TargetSource};
use crate::render::{RenderFrame, Renderer};
use crate::state::{HostInputs, PlaybackState};
use tracing::{info, warn};

/// Live levels older than this are treated as no signal (seconds).
/// Loopback devices stop calling back when nothing is playing.
const STALE_LEVELS_SECS: f64 = 0.25;

/// Audio-reactive bar visualizer
pub struct Visualizer<C: Clock> {
    config: VisualizerConfig,
    driver: AnimationDriver,
    capture: Option<LoopbackCapture>,
    levels: SharedBandLevels,
    level_buf: Vec<f32>,
    clock: C,
    inputs: HostInputs,
    last_generation: u64,
    last_fresh_at: f64,
}

impl<C: Clock> Visualizer<C> {
    /// Visualizer capturing through this build's default backend
    pub fn new(config: VisualizerConfig, clock: C) -> crate::Result<Self> {
        Self::with_backend(config, clock, backend::default_backend)
    }

    /// Visualizer capturing through a custom backend.
    ///
    /// `make_backend` runs on the capture worker thread.
    pub fn with_backend<F, B>(config: VisualizerConfig, clock: C, make_backend: F) -> crate::Result<Self>
    where
        F: FnOnce() -> B + Send + 'static,
        B: CaptureBackend,
    {
        let driver = AnimationDriver::new(&config)?;
        let levels = SharedBandLevels::new(config.bar_count);

        let capture = match LoopbackCapture::spawn(&config, levels.clone(), make_backend) {
            Ok(capture) => Some(capture),
            Err(e) => {
                warn!("Audio capture disabled: {}", e);
                None
            }
        };

        Ok(Self::assemble(config, driver, clock, levels, capture))
    }

    /// Visualizer that only ever shows fallback motion
    pub fn without_capture(config: VisualizerConfig, clock: C) -> crate::Result<Self> {
        let driver = AnimationDriver::new(&config)?;
        let levels = SharedBandLevels::new(config.bar_count);
        Ok(Self::assemble(config, driver, clock, levels, None))
    }

    fn assemble(
        config: VisualizerConfig,
        driver: AnimationDriver,
        clock: C,
        levels: SharedBandLevels,
        capture: Option<LoopbackCapture>,
    ) -> Self {
        info!(
            "Visualizer ready: {} bars, capture {}",
            config.bar_count,
            if capture.is_some() { "enabled" } else { "disabled" }
        );
        Self {
            driver,
            level_buf: vec![0.0; config.bar_count],
            config,
            capture,
            levels,
            clock,
            inputs: HostInputs::default(),
            last_generation: 0,
            last_fresh_at: 0.0,
        }
    }

    /// Apply host inputs; does nothing if they equal the previous ones
    pub fn update(&mut self, inputs: HostInputs) {
        if inputs == self.inputs {
            return;
        }

        let now = self.clock.now();
        let directive = self.driver.set_inputs(
            inputs.effective_state(),
            &inputs.track_id,
            inputs.visible,
            self.levels.is_active(),
            now,
        );
        self.inputs = inputs;
        self.apply(directive);

        let next = self.driver.schedule();
        self.clock.request_tick(next);
    }

    /// Advance one render tick. Returns the frame to draw, or `None` when the
    /// tick was skipped (clock warming up or not advanced).
    pub fn tick(&mut self) -> Option<RenderFrame<'_>> {
        let now = self.clock.now();
        let snapshot = self.levels.snapshot_into(&mut self.level_buf);

        if snapshot.generation != self.last_generation {
            self.last_generation = snapshot.generation;
            self.last_fresh_at = now;
        }
        let live = snapshot.active && now - self.last_fresh_at <= STALE_LEVELS_SECS;

        let outcome = self.driver.tick(now, &self.level_buf, live);
        self.apply(outcome.directive);

        let next = self.driver.schedule();
        self.clock.request_tick(next);

        if outcome.advanced {
            Some(self.frame())
        } else {
            None
        }
    }

    /// Tick and hand the frame to `renderer` if one was produced
    pub fn tick_and_render<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> bool {
        match self.tick() {
            Some(frame) => {
                renderer.draw(&frame);
                true
            }
            None => false,
        }
    }

    /// Current visual state without advancing
    pub fn frame(&self) -> RenderFrame<'_> {
        RenderFrame {
            bar_heights: self.driver.heights(),
            opacity: self.driver.opacity(),
            accent: self.inputs.accent,
        }
    }

    fn apply(&mut self, directive: Option<CaptureDirective>) {
        let Some(directive) = directive else {
            return;
        };
        match (&self.capture, directive) {
            (Some(capture), CaptureDirective::Start) => capture.start(),
            (Some(capture), CaptureDirective::Stop) => capture.stop(),
            (None, _) => {}
        }
    }

    /// Whether live audio is flowing
    pub fn is_capturing(&self) -> bool {
        self.levels.is_active()
    }

    /// Capture counters, if capture is enabled
    pub fn capture_stats(&self) -> Option<CaptureStats> {
        self.capture.as_ref().map(LoopbackCapture::stats)
    }

    /// Source of the most recent tick's targets
    pub fn target_source(&self) -> TargetSource {
        self.driver.target_source()
    }

    /// Effective playback state
    pub fn state(&self) -> PlaybackState {
        self.driver.state()
    }

    /// The animation driver
    pub fn driver(&self) -> &AnimationDriver {
        &self.driver
    }

    /// Active configuration
    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    /// The render clock
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The render clock, mutably (tests step a manual clock through this)
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}
