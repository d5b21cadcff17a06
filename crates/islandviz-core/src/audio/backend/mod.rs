//! Audio device backends
//!
//! A backend opens one stream at a time and pushes every callback buffer into
//! the [`FrameSink`] it was opened with. Backends are created and used on the
//! capture worker thread only, so they need not be `Send`.

#[cfg(feature = "audio")]
pub mod cpal_backend;
#[cfg(any(test, feature = "mock-audio"))]
pub mod mock;

use super::capture::{CaptureError, Started};
use super::AudioFrameBatch;
use std::sync::Arc;

/// Receives each PCM buffer on the device callback thread
pub type FrameSink = Box<dyn FnMut(&AudioFrameBatch<'_>) + Send + 'static>;

/// Called from the device thread when the stream fails after opening
pub type ErrorNotifier = Arc<dyn Fn(CaptureError) + Send + Sync + 'static>;

/// Audio device backend
pub trait CaptureBackend {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Open the loopback stream and start delivering buffers to `sink`
    fn open(&mut self, sink: FrameSink, on_error: ErrorNotifier) -> Result<Started, CaptureError>;

    /// Stop the stream. Must unregister the callback (dropping `sink`)
    /// before returning. Calling it when closed does nothing.
    fn close(&mut self);

    /// Whether a stream is open
    fn is_open(&self) -> bool;
}

/// Backend for builds without audio support; never finds a device
#[derive(Debug, Default)]
pub struct NullBackend;

impl CaptureBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn open(&mut self, _sink: FrameSink, _on_error: ErrorNotifier) -> Result<Started, CaptureError> {
        Err(CaptureError::NoDevice)
    }

    fn close(&mut self) {}

    fn is_open(&self) -> bool {
        false
    }
}

/// Default backend for this build: cpal when the `audio` feature is on
#[cfg(feature = "audio")]
pub fn default_backend() -> Box<dyn CaptureBackend> {
    Box::new(cpal_backend::CpalLoopbackBackend::new(None))
}

/// Default backend for this build: cpal when the `audio` feature is on
#[cfg(not(feature = "audio"))]
pub fn default_backend() -> Box<dyn CaptureBackend> {
    Box::new(NullBackend)
}

impl<B: CaptureBackend + ?Sized> CaptureBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn open(&mut self, sink: FrameSink, on_error: ErrorNotifier) -> Result<Started, CaptureError> {
        (**self).open(sink, on_error)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}
