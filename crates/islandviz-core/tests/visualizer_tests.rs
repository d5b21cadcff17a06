use islandviz_core::audio::backend::mock::{MockBackend, MockHandle};
use islandviz_core::driver::smooth_toward;
use islandviz_core::fallback::bar_seed;
use islandviz_core::{
    fnv1a, AccentColor, CaptureError, Clock, FallbackMotion, HostInputs, ManualClock,
    PlaybackState, TargetSource, Visualizer, VisualizerConfig,
};
use std::thread;
use std::time::{Duration, Instant};

fn wait_for_condition<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::yield_now();
        thread::sleep(Duration::from_millis(1));
    }
    false
}

fn inputs(state: PlaybackState, track: &str) -> HostInputs {
    HostInputs {
        state,
        track_id: track.to_string(),
        visible: true,
        accent: AccentColor::rgb(255, 128, 0),
    }
}

/// Stereo sine at a bass frequency, loud enough to saturate the first band
fn bass_tone(frames: usize) -> Vec<f32> {
    (0..frames)
        .flat_map(|i| {
            let s = (2.0 * std::f32::consts::PI * 94.0 * i as f32 / 48_000.0).sin() * 0.5;
            [s, s]
        })
        .collect()
}

fn step(viz: &mut Visualizer<ManualClock>, ticks: usize) {
    for _ in 0..ticks {
        if !viz.clock_mut().advance_to_tick() {
            break;
        }
        viz.tick();
    }
}

fn mock_visualizer() -> (Visualizer<ManualClock>, MockHandle) {
    let (backend, handle) = MockBackend::new();
    let viz = Visualizer::with_backend(VisualizerConfig::default(), ManualClock::new(), move || {
        backend
    })
    .unwrap();
    (viz, handle)
}

#[test]
fn test_idle_with_empty_track_rests_at_minimum() {
    let mut viz =
        Visualizer::without_capture(VisualizerConfig::default(), ManualClock::new()).unwrap();
    viz.update(inputs(PlaybackState::Idle, ""));

    // Already at rest, so no tick is needed
    assert_eq!(viz.clock().requested(), None);

    let frame = viz.frame();
    assert_eq!(frame.bar_count(), 5);
    assert!(frame.bar_heights.iter().all(|&h| h == 0.15));
    assert_eq!(frame.opacity, 0.2);
}

#[test]
fn test_empty_track_while_playing_is_treated_as_idle() {
    let mut viz =
        Visualizer::without_capture(VisualizerConfig::default(), ManualClock::new()).unwrap();
    viz.update(inputs(PlaybackState::Playing, ""));
    assert_eq!(viz.state(), PlaybackState::Idle);
    assert_eq!(viz.clock().requested(), None);
}

#[test]
fn test_playing_without_capture_follows_fallback_motion() {
    let config = VisualizerConfig::default();
    let motion = FallbackMotion::new(config.min_ratio, config.max_ratio);
    let mut viz = Visualizer::without_capture(config, ManualClock::new()).unwrap();
    viz.update(inputs(PlaybackState::Playing, "abc"));

    assert_eq!(bar_seed("abc", 0), fnv1a("abc0"));
    assert_eq!(viz.clock().requested(), Some(viz.config().playing_tick_interval()));

    viz.tick();
    for _ in 0..120 {
        assert!(viz.clock_mut().advance_to_tick());
        assert!(viz.tick().is_some());
        assert_eq!(viz.target_source(), TargetSource::Fallback);

        let elapsed = viz.driver().elapsed();
        for (i, bar) in viz.driver().bars().iter().enumerate() {
            let expected = motion.height(i, "abc", elapsed, PlaybackState::Playing);
            assert_eq!(bar.last_target, expected);
            assert!((0.15..=1.0).contains(&bar.current));
        }
    }

    // Bars are not all parked at the floor
    assert!(viz.frame().bar_heights.iter().any(|&h| h > 0.2));
}

#[test]
fn test_same_track_animates_identically() {
    let run = || {
        let mut viz =
            Visualizer::without_capture(VisualizerConfig::default(), ManualClock::new()).unwrap();
        viz.update(inputs(PlaybackState::Playing, "track-42"));
        viz.tick();
        step(&mut viz, 90);
        viz.frame().bar_heights.to_vec()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_paused_ticks_slowly_and_settles_low() {
    let mut viz =
        Visualizer::without_capture(VisualizerConfig::default(), ManualClock::new()).unwrap();
    viz.update(inputs(PlaybackState::Playing, "abc"));
    viz.tick();
    step(&mut viz, 60);

    viz.update(inputs(PlaybackState::Paused, "abc"));
    let interval = viz.clock().requested().unwrap();
    assert!(interval >= Duration::from_millis(100), "paused at {interval:?}");

    step(&mut viz, 40);
    let frame = viz.frame();
    assert!((frame.opacity - 0.5).abs() < 1e-3, "opacity {}", frame.opacity);
    for &h in frame.bar_heights {
        assert!((h - 0.15).abs() < 1e-3, "height {h}");
    }
    // Paused keeps ticking
    assert!(viz.clock().requested().is_some());
}

#[test]
fn test_idle_settles_then_suspends() {
    let mut viz =
        Visualizer::without_capture(VisualizerConfig::default(), ManualClock::new()).unwrap();
    viz.update(inputs(PlaybackState::Playing, "abc"));
    viz.tick();
    step(&mut viz, 60);

    viz.update(inputs(PlaybackState::Idle, "abc"));
    assert!(viz.clock().requested().is_some());

    step(&mut viz, 200);
    assert_eq!(viz.clock().requested(), None);

    let frame = viz.frame();
    assert_eq!(frame.opacity, 0.2);
    assert!(frame.bar_heights.iter().all(|&h| h == 0.15));
}

#[test]
fn test_hidden_suspends_ticks() {
    let mut viz =
        Visualizer::without_capture(VisualizerConfig::default(), ManualClock::new()).unwrap();
    viz.update(inputs(PlaybackState::Playing, "abc"));
    viz.update(HostInputs {
        visible: false,
        ..inputs(PlaybackState::Playing, "abc")
    });
    assert_eq!(viz.clock().requested(), None);
}

#[test]
fn test_live_audio_drives_bars() {
    let (mut viz, handle) = mock_visualizer();
    viz.update(inputs(PlaybackState::Playing, "abc"));
    assert!(
        wait_for_condition(Duration::from_secs(2), || viz.is_capturing()),
        "capture never started"
    );
    viz.tick();

    assert!(handle.feed(&bass_tone(4096), 2, 48_000));
    assert!(viz.clock_mut().advance_to_tick());
    assert!(viz.tick().is_some());
    assert_eq!(viz.target_source(), TargetSource::Live);

    let stats = viz.capture_stats().unwrap();
    assert_eq!(stats.sessions_started, 1);
    assert!(stats.spectra >= 4);
    assert_eq!(stats.samples, 8192);

    // Bass bar is the one rising fastest
    let bars = viz.driver().bars();
    assert!(bars[0].last_target > bars[4].last_target);
}

#[test]
fn test_silent_capture_goes_stale_and_falls_back() {
    let (mut viz, handle) = mock_visualizer();
    viz.update(inputs(PlaybackState::Playing, "abc"));
    assert!(wait_for_condition(Duration::from_secs(2), || viz.is_capturing()));
    viz.tick();

    handle.feed(&bass_tone(2048), 2, 48_000);
    step(&mut viz, 1);
    assert_eq!(viz.target_source(), TargetSource::Live);

    // No callbacks for longer than the staleness window
    step(&mut viz, 30);
    assert_eq!(viz.target_source(), TargetSource::Fallback);
    assert!(viz.is_capturing());
}

#[test]
fn test_device_loss_falls_back_without_snapping() {
    let (mut viz, handle) = mock_visualizer();
    viz.update(inputs(PlaybackState::Playing, "abc"));
    assert!(wait_for_condition(Duration::from_secs(2), || viz.is_capturing()));
    viz.tick();

    for _ in 0..10 {
        handle.feed(&bass_tone(1024), 2, 48_000);
        step(&mut viz, 1);
    }
    assert_eq!(viz.target_source(), TargetSource::Live);
    let before = viz.frame().bar_heights.to_vec();
    let live_targets: Vec<f32> = viz.driver().bars().iter().map(|b| b.last_target).collect();
    let then = viz.clock().now();

    handle.lose_device();
    assert!(!viz.is_capturing());
    step(&mut viz, 1);
    assert_eq!(viz.target_source(), TargetSource::Fallback);

    // Each bar moves exactly one smoothing step toward its fallback target
    let config = viz.config().clone();
    let dt_ms = ((viz.clock().now() - then) * 1000.0) as f32;
    let mut retargeted = false;
    for (i, bar) in viz.driver().bars().iter().enumerate() {
        let target = bar.last_target;
        let tau = if target > before[i] {
            config.attack_tau_ms
        } else {
            config.decay_tau_ms
        };
        let expected =
            smooth_toward(before[i], target, dt_ms, tau).clamp(config.min_ratio, config.max_ratio);
        assert!(
            (bar.current - expected).abs() < 1e-5,
            "bar {i}: {} -> {}, expected {expected}",
            before[i],
            bar.current
        );
        retargeted |= (target - live_targets[i]).abs() > 1e-3;
    }
    assert!(retargeted, "targets did not switch to fallback motion");

    assert!(
        wait_for_condition(Duration::from_secs(2), || !handle.is_open()),
        "worker did not close the lost device"
    );
    assert_eq!(viz.capture_stats().unwrap().failures, 1);
}

#[test]
fn test_start_failure_falls_back_and_retries_on_next_play() {
    let (mut viz, handle) = mock_visualizer();
    handle.fail_next_open(CaptureError::PermissionDenied);

    viz.update(inputs(PlaybackState::Playing, "abc"));
    assert!(wait_for_condition(Duration::from_secs(2), || {
        viz.capture_stats().unwrap().failures == 1
    }));
    assert!(!viz.is_capturing());

    viz.tick();
    step(&mut viz, 5);
    assert_eq!(viz.target_source(), TargetSource::Fallback);

    viz.update(inputs(PlaybackState::Paused, "abc"));
    viz.update(inputs(PlaybackState::Playing, "abc"));
    assert!(
        wait_for_condition(Duration::from_secs(2), || viz.is_capturing()),
        "capture was not retried"
    );
    assert_eq!(handle.open_count(), 1);
}

#[test]
fn test_hiding_closes_capture() {
    let (mut viz, handle) = mock_visualizer();
    viz.update(inputs(PlaybackState::Playing, "abc"));
    assert!(wait_for_condition(Duration::from_secs(2), || handle.is_open()));

    viz.update(HostInputs {
        visible: false,
        ..inputs(PlaybackState::Playing, "abc")
    });
    assert!(wait_for_condition(Duration::from_secs(2), || !handle.is_open()));
    assert!(!viz.is_capturing());
    assert_eq!(handle.close_count(), 1);
}

#[test]
fn test_pause_grace_expiry_closes_capture() {
    let (mut viz, handle) = mock_visualizer();
    viz.update(inputs(PlaybackState::Playing, "abc"));
    assert!(wait_for_condition(Duration::from_secs(2), || handle.is_open()));
    viz.tick();

    viz.update(inputs(PlaybackState::Paused, "abc"));
    // 8 Hz for six seconds outlasts the five second grace
    step(&mut viz, 48);
    assert!(wait_for_condition(Duration::from_secs(2), || !handle.is_open()));
}

#[test]
fn test_dropping_visualizer_closes_device() {
    let (mut viz, handle) = mock_visualizer();
    viz.update(inputs(PlaybackState::Playing, "abc"));
    assert!(wait_for_condition(Duration::from_secs(2), || handle.is_open()));

    drop(viz);
    assert!(!handle.is_open());
}
