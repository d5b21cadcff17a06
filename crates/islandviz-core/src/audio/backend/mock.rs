//! In-memory backend for tests and demos without a sound card
//!
//! [`MockBackend`] lives on the capture worker; the paired [`MockHandle`]
//! stays with the caller and plays the role of the OS audio thread.

use super::{CaptureBackend, ErrorNotifier, FrameSink};
use crate::audio::capture::{CaptureError, Started};
use crate::audio::AudioFrameBatch;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct MockState {
    sink: Option<FrameSink>,
    on_error: Option<ErrorNotifier>,
    fail_with: Option<CaptureError>,
    opens: usize,
    closes: usize,
}

/// Test double for an audio device
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    sample_rate: u32,
    channels: u16,
}

/// Caller-side control of a [`MockBackend`]
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Stereo 48 kHz mock device and its handle
    pub fn new() -> (Self, MockHandle) {
        Self::with_format(48_000, 2)
    }

    /// Mock device with a specific format
    pub fn with_format(sample_rate: u32, channels: u16) -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let backend = Self {
            state: Arc::clone(&state),
            sample_rate,
            channels,
        };
        (backend, MockHandle { state })
    }
}

impl CaptureBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(&mut self, sink: FrameSink, on_error: ErrorNotifier) -> Result<Started, CaptureError> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_with.take() {
            return Err(err);
        }
        state.sink = Some(sink);
        state.on_error = Some(on_error);
        state.opens += 1;
        Ok(Started {
            device: "Mock Loopback".to_string(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        if state.sink.take().is_some() {
            state.closes += 1;
        }
        state.on_error = None;
    }

    fn is_open(&self) -> bool {
        self.state.lock().sink.is_some()
    }
}

impl MockHandle {
    /// Make the next `open` fail with `err`
    pub fn fail_next_open(&self, err: CaptureError) {
        self.state.lock().fail_with = Some(err);
    }

    /// Deliver one interleaved buffer as the device thread would.
    ///
    /// Returns `false` when no stream is open.
    pub fn feed(&self, samples: &[f32], channels: u16, sample_rate: u32) -> bool {
        let mut state = self.state.lock();
        match state.sink.as_mut() {
            Some(sink) => {
                sink(&AudioFrameBatch::new(samples, channels, sample_rate));
                true
            }
            None => false,
        }
    }

    /// Error callback of the open stream, kept to simulate late reports
    pub fn error_notifier(&self) -> Option<ErrorNotifier> {
        self.state.lock().on_error.clone()
    }

    /// Report the device as disconnected
    pub fn lose_device(&self) {
        let notifier = self.state.lock().on_error.clone();
        if let Some(notify) = notifier {
            notify(CaptureError::DeviceLost);
        }
    }

    /// Whether a stream is open
    pub fn is_open(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    /// Successful opens so far
    pub fn open_count(&self) -> usize {
        self.state.lock().opens
    }

    /// Closes of an open stream so far
    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }
}
